//! Response cache — concurrent key/value store with per-entry TTL.
//!
//! Entries are idempotent snapshots of a handler response, keyed by method +
//! full path so keys never collide across methods. Expiry is evaluated lazily
//! on read; an entry whose deadline has passed is treated as absent and
//! evicted. Concurrent misses for the same key may both compute and store —
//! last-writer-wins is fine because both writers snapshot the same resource.
//!
//! The store is explicitly injected into [`CachingStage`] rather than being
//! ambient process state, so tests can substitute a fresh instance.
//!
//! [`CachingStage`]: crate::stages::CachingStage

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::http::{Request, Response};

/// Default time-to-live for cached responses: 15 minutes.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    response: Response,
    expires_at: Instant,
}

/// A concurrent TTL'd store of response snapshots.
///
/// Backed by a sharded map; gets and sets on different keys never contend
/// and no global lock is held around writes.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gantry::cache::CacheStore;
/// use gantry::http::{Method, Request, Response, StatusCode};
///
/// let store = CacheStore::new();
/// let request = Request::builder(Method::Get, "/posts/1").build();
/// let key = CacheStore::key_for(&request);
///
/// assert!(store.get(&key).is_none());
/// store.insert(key.clone(), Response::new(StatusCode::Ok).body("body1"), Duration::from_secs(60));
/// assert!(store.get(&key).is_some());
/// ```
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl CacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the cache key for a request: method plus full path (including
    /// the query string). Deterministic, and method-qualified so a GET and a
    /// POST to the same path never share an entry.
    pub fn key_for(request: &Request) -> String {
        format!("{} {}", request.method(), request.full_path())
    }

    /// Returns a clone of the stored response, or `None` if the key is absent
    /// or its TTL has elapsed. Expired entries are evicted on the spot.
    pub fn get(&self, key: &str) -> Option<Response> {
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > Instant::now() {
                return Some(entry.response.clone());
            }
            // Guard dropped here before the eviction below touches the shard.
        }
        self.entries.remove(key);
        None
    }

    /// Stores a response snapshot under `key` for `ttl`. An existing entry is
    /// overwritten unconditionally.
    pub fn insert(&self, key: String, response: Response, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                response,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drops every entry whose TTL has elapsed and returns how many were
    /// removed. Lazy eviction in [`get`](Self::get) already keeps reads
    /// correct; this exists for hosts that want a periodic background sweep.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    /// Returns the number of live-or-expired entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
