//! Failure containment for the inner chain and the domain handler.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::error;

use crate::http::{Request, Response, StatusCode};
use crate::pipeline::{Middleware, Next, ResponseFuture};

/// Converts panics from inner stages or the domain handler into a 500.
///
/// The rest of the chain runs inside a `catch_unwind` boundary within the
/// caller's own future, so a panic unwinds here and becomes a response while
/// the executor and the connection task never terminate abnormally. Because
/// nothing is spawned, a pipeline deadline that drops the in-flight future
/// still cancels the guarded chain. Place this near the outermost position
/// so it covers every inner stage.
///
/// The panic payload is always logged. It is only echoed into the response
/// body when [`expose_detail`](Self::expose_detail) is enabled, which is
/// meant for development setups; production deployments keep the generic
/// body.
pub struct ExceptionGuardStage {
    expose_detail: bool,
}

impl ExceptionGuardStage {
    pub fn new() -> Self {
        Self {
            expose_detail: false,
        }
    }

    /// Include the panic message in the 500 body. Development only.
    #[must_use]
    pub fn expose_detail(mut self, expose: bool) -> Self {
        self.expose_detail = expose;
        self
    }
}

impl Default for ExceptionGuardStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for ExceptionGuardStage {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture {
        let expose_detail = self.expose_detail;
        Box::pin(async move {
            let method = request.method().as_str().to_owned();
            let path = request.path().to_owned();

            // The chain state is discarded on unwind, so the unwind-safety
            // assertion cannot expose broken invariants to later requests.
            match AssertUnwindSafe(next.run(request)).catch_unwind().await {
                Ok(response) => response,
                Err(payload) => {
                    let detail = panic_message(payload);
                    error!(%method, %path, %detail, "handler failure contained");

                    if expose_detail {
                        Response::error(StatusCode::InternalServerError, &detail)
                    } else {
                        Response::error(StatusCode::InternalServerError, "Internal server error")
                    }
                }
            }
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::pipeline::Pipeline;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn get() -> Request {
        Request::builder(Method::Get, "/posts/1").build()
    }

    #[tokio::test]
    async fn handler_panic_becomes_500() {
        let pipeline = Pipeline::builder()
            .stage(ExceptionGuardStage::new())
            .build(|_| async { panic!("database exploded") });

        let response = pipeline.execute(get()).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert_eq!(response.body_ref(), br#"{"error":"Internal server error"}"#);
    }

    #[tokio::test]
    async fn detail_is_hidden_unless_exposed() {
        let hardened = Pipeline::builder()
            .stage(ExceptionGuardStage::new())
            .build(|_| async { panic!("secret table missing") });
        let body = hardened.execute(get()).await;
        let text = std::str::from_utf8(body.body_ref()).unwrap().to_owned();
        assert!(!text.contains("secret table missing"));

        let dev = Pipeline::builder()
            .stage(ExceptionGuardStage::new().expose_detail(true))
            .build(|_| async { panic!("secret table missing") });
        let body = dev.execute(get()).await;
        let text = std::str::from_utf8(body.body_ref()).unwrap().to_owned();
        assert!(text.contains("secret table missing"));
    }

    #[tokio::test]
    async fn panic_in_an_inner_stage_is_contained() {
        struct Explode;
        impl Middleware for Explode {
            fn handle(&self, _request: Request, _next: Next) -> ResponseFuture {
                Box::pin(async { panic!("stage bug") })
            }
        }

        let pipeline = Pipeline::builder()
            .stage(ExceptionGuardStage::new())
            .stage(Explode)
            .build(|_| async { Response::new(StatusCode::Ok) });

        let response = pipeline.execute(get()).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn guarded_chain_is_still_cancelled_by_the_deadline() {
        let completed = Arc::new(AtomicBool::new(false));
        let pipeline = Pipeline::builder()
            .timeout(Duration::from_millis(20))
            .stage(ExceptionGuardStage::new())
            .build({
                let completed = Arc::clone(&completed);
                move |_| {
                    let completed = Arc::clone(&completed);
                    async move {
                        tokio::time::sleep(Duration::from_millis(80)).await;
                        completed.store(true, Ordering::SeqCst);
                        Response::new(StatusCode::Ok)
                    }
                }
            });

        let response = pipeline.execute(get()).await;
        assert_eq!(response.status(), StatusCode::GatewayTimeout);

        // Long after the handler would have finished, it must not have run
        // to completion: the guard may not detach the chain from the timed
        // future.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn healthy_chain_is_untouched() {
        let pipeline = Pipeline::builder()
            .stage(ExceptionGuardStage::new())
            .build(|_| async { Response::new(StatusCode::Ok).body("fine") });

        let response = pipeline.execute(get()).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body_ref(), b"fine");
    }
}
