//! Pipeline configuration surface.

use std::time::Duration;

use serde::Deserialize;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::limit::{DEFAULT_RATE_LIMIT_THRESHOLD, DEFAULT_RATE_LIMIT_WINDOW};
use crate::notify::DEFAULT_QUEUE_CAPACITY;

/// Recognized deployment options for the standard pipeline.
///
/// Deserializable from any `serde` format the host uses; every field has a
/// default so partial configuration works.
///
/// # Examples
///
/// ```
/// use gantry::config::PipelineConfig;
///
/// let config: PipelineConfig = serde_json::from_str(
///     r#"{"rate_limit_threshold": 10, "cache_ttl_secs": 60}"#,
/// ).unwrap();
/// assert_eq!(config.rate_limit_threshold, 10);
/// assert_eq!(config.cache_ttl().as_secs(), 60);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Webhook receiving excessive-request notifications; `None` disables them.
    pub notify_url: Option<String>,
    /// Collector receiving performance samples; `None` disables them.
    pub monitoring_url: Option<String>,
    /// Requests a client may make within one window before rejection.
    pub rate_limit_threshold: u64,
    /// Accumulation window length, in seconds.
    pub rate_limit_window_secs: u64,
    /// Cached response time-to-live, in seconds.
    pub cache_ttl_secs: u64,
    /// Per-request execution deadline, in seconds. Zero disables the deadline.
    pub request_timeout_secs: u64,
    /// Bounded notification queue size; overflow drops payloads.
    pub notify_queue_capacity: usize,
}

impl PipelineConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// `None` when the deadline is disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            notify_url: None,
            monitoring_url: None,
            rate_limit_threshold: DEFAULT_RATE_LIMIT_THRESHOLD,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW.as_secs(),
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            request_timeout_secs: 30,
            notify_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.rate_limit_threshold, 100);
        assert_eq!(config.rate_limit_window().as_secs(), 3600);
        assert_eq!(config.cache_ttl().as_secs(), 15 * 60);
        assert!(config.notify_url.is_none());
        assert!(config.request_timeout().is_some());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"notify_url": "http://collector.local/abuse"}"#).unwrap();
        assert_eq!(
            config.notify_url.as_deref(),
            Some("http://collector.local/abuse")
        );
        assert_eq!(config.rate_limit_threshold, 100);
    }

    #[test]
    fn zero_timeout_disables_the_deadline() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"request_timeout_secs": 0}"#).unwrap();
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<PipelineConfig, _> =
            serde_json::from_str(r#"{"rate_limt_threshold": 10}"#);
        assert!(result.is_err());
    }
}
