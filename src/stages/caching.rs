//! GET response caching.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheStore, DEFAULT_CACHE_TTL};
use crate::http::{Method, Request, Response, StatusCode};
use crate::pipeline::{Middleware, Next, ResponseFuture};

/// Serves repeated GETs from an injected [`CacheStore`].
///
/// Non-GET requests bypass the cache entirely. On a hit the cached snapshot
/// is returned without invoking the rest of the chain. On a miss the chain
/// runs, and only an exact 200 response is stored; anything else passes
/// through uncached.
pub struct CachingStage {
    store: Arc<CacheStore>,
    ttl: Duration,
}

impl CachingStage {
    pub fn new(store: Arc<CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Uses the default 15-minute TTL.
    pub fn with_default_ttl(store: Arc<CacheStore>) -> Self {
        Self::new(store, DEFAULT_CACHE_TTL)
    }
}

impl Middleware for CachingStage {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture {
        let store = Arc::clone(&self.store);
        let ttl = self.ttl;
        Box::pin(async move {
            if request.method() != &Method::Get {
                return next.run(request).await;
            }

            let key = CacheStore::key_for(&request);
            if let Some(cached) = store.get(&key) {
                debug!(%key, "cache hit");
                return cached;
            }

            debug!(%key, "cache miss");
            let response = next.run(request).await;
            if response.status() == StatusCode::Ok {
                store.insert(key, response.clone(), ttl);
            }
            response
        })
    }
}
