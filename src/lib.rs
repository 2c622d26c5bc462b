//! # gantry
//!
//! A composable async HTTP middleware pipeline: ordered cross-cutting stages
//! (logging, auth, response caching, rate limiting, transport enforcement,
//! timing, failure containment, performance monitoring) wrapped around an
//! opaque domain handler, with explicitly injected shared state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gantry::config::PipelineConfig;
//! use gantry::http::{Response, StatusCode};
//! use gantry::server::Server;
//! use gantry::stages::StaticTokenValidator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = gantry::standard_pipeline(
//!         &PipelineConfig::default(),
//!         Arc::new(StaticTokenValidator::new("s3cret")),
//!         |_req| async { Response::new(StatusCode::Ok).body("Hello, World!") },
//!     );
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.serve(pipeline).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod http;
pub mod limit;
pub mod notify;
pub mod pipeline;
pub mod server;
pub mod stages;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use pipeline::{Middleware, Next, Pipeline, PipelineBuilder};
pub use server::{Server, ServerError};

use std::future::Future;
use std::sync::Arc;

use cache::CacheStore;
use config::PipelineConfig;
use limit::RateLimitCounter;
use notify::NotificationDispatcher;
use stages::{
    AuthStage, CachingStage, ExceptionGuardStage, LoggingStage, MonitoringStage, RateLimitStage,
    SslEnforcerStage, TimingStage, TokenValidator,
};

/// Assembles the standard stage chain around a domain handler.
///
/// Outermost to innermost: exception guard, timing, logging, monitoring, SSL
/// enforcement, auth, rate limiting, caching. The guard sits outside
/// everything so it contains failures from every inner stage; timing sits
/// outside the short-circuiting stages so hits and rejections carry a
/// duration header too. Fresh cache and counter stores are created per
/// pipeline, and a notification worker is spawned for the configured
/// collector URLs. Must be called within a Tokio runtime.
pub fn standard_pipeline<H, F>(
    config: &PipelineConfig,
    validator: Arc<dyn TokenValidator>,
    handler: H,
) -> Pipeline
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let cache = Arc::new(CacheStore::new());
    let counter = Arc::new(RateLimitCounter::new(config.rate_limit_window()));
    let dispatcher = NotificationDispatcher::spawn(
        config.notify_url.clone(),
        config.monitoring_url.clone(),
        config.notify_queue_capacity,
    );

    let mut builder = Pipeline::builder()
        .stage(ExceptionGuardStage::new())
        .stage(TimingStage)
        .stage(LoggingStage)
        .stage(MonitoringStage::new(dispatcher.clone()))
        .stage(SslEnforcerStage)
        .stage(AuthStage::new(validator))
        .stage(RateLimitStage::new(
            counter,
            config.rate_limit_threshold,
            dispatcher,
        ))
        .stage(CachingStage::new(cache, config.cache_ttl()));

    if let Some(limit) = config.request_timeout() {
        builder = builder.timeout(limit);
    }

    builder.build(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stages::{DURATION_HEADER, StaticTokenValidator};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            rate_limit_threshold: 3,
            ..PipelineConfig::default()
        }
    }

    fn standard(hits: Arc<AtomicUsize>) -> Pipeline {
        standard_pipeline(
            &test_config(),
            Arc::new(StaticTokenValidator::new("s3cret")),
            move |request: Request| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Response::new(StatusCode::Ok).body(format!("post at {}", request.path()))
                }
            },
        )
    }

    fn authed_get(path: &str, ip: &str) -> Request {
        Request::builder(Method::Get, path)
            .header("Authorization", "Bearer s3cret")
            .header("Host", "blog.example.com")
            .remote_addr(ip.parse().unwrap())
            .secure(true)
            .build()
    }

    #[tokio::test]
    async fn full_chain_serves_and_caches() {
        let hits = Arc::new(AtomicUsize::new(0));
        let pipeline = standard(Arc::clone(&hits));

        let miss = pipeline.execute(authed_get("/posts/1", "10.0.0.1")).await;
        assert_eq!(miss.status(), StatusCode::Ok);
        assert_eq!(miss.body_ref(), b"post at /posts/1");
        assert!(miss.headers().contains(DURATION_HEADER));

        let hit = pipeline.execute(authed_get("/posts/1", "10.0.0.1")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1, "second GET must be served from cache");
        assert_eq!(hit.body_ref(), miss.body_ref());
        assert!(hit.headers().contains(DURATION_HEADER));
    }

    #[tokio::test]
    async fn full_chain_throttles_after_threshold() {
        let hits = Arc::new(AtomicUsize::new(0));
        let pipeline = standard(Arc::clone(&hits));

        for i in 0..3 {
            let path = format!("/posts/{i}");
            let response = pipeline.execute(authed_get(&path, "10.0.0.9")).await;
            assert_eq!(response.status(), StatusCode::Ok);
        }

        let rejected = pipeline.execute(authed_get("/posts/9", "10.0.0.9")).await;
        assert_eq!(rejected.status(), StatusCode::TooManyRequests);
        // Rejections still carry the timing header: timing wraps the limiter.
        assert!(rejected.headers().contains(DURATION_HEADER));
    }

    #[tokio::test]
    async fn full_chain_redirects_insecure_requests() {
        let pipeline = standard(Arc::new(AtomicUsize::new(0)));
        let request = Request::builder(Method::Get, "/posts/1")
            .header("Authorization", "Bearer s3cret")
            .header("Host", "blog.example.com")
            .build();

        let response = pipeline.execute(request).await;
        assert_eq!(response.status(), StatusCode::MovedPermanently);
        assert_eq!(
            response.headers().get("location"),
            Some("https://blog.example.com/posts/1")
        );
    }

    #[tokio::test]
    async fn full_chain_rejects_bad_credentials() {
        let hits = Arc::new(AtomicUsize::new(0));
        let pipeline = standard(Arc::clone(&hits));
        let request = Request::builder(Method::Get, "/posts/1")
            .header("Authorization", "Bearer wrong")
            .secure(true)
            .build();

        let response = pipeline.execute(request).await;
        assert_eq!(response.status(), StatusCode::Unauthorized);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn full_chain_contains_handler_panics() {
        let pipeline = standard_pipeline(
            &test_config(),
            Arc::new(StaticTokenValidator::new("s3cret")),
            |_| async { panic!("post table missing") },
        );

        let response = pipeline.execute(authed_get("/posts/1", "10.0.0.1")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        let text = std::str::from_utf8(response.body_ref()).unwrap();
        assert!(!text.contains("post table missing"));
    }
}
