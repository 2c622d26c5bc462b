//! Observation stages: request logging, timing instrumentation, and external
//! performance monitoring.

use tokio::time::Instant;
use tracing::info;

use crate::http::{Request, Response};
use crate::notify::{Notification, NotificationDispatcher};
use crate::pipeline::{Middleware, Next, ResponseFuture};

/// Header carrying the request's wall-clock duration in fractional
/// milliseconds.
pub const DURATION_HEADER: &str = "X-Request-Duration";

/// Logs method + path before the chain runs and status + duration after.
///
/// Pure side effect: never short-circuits, never touches the response body.
pub struct LoggingStage;

impl Middleware for LoggingStage {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture {
        Box::pin(async move {
            let method = request.method().as_str().to_owned();
            let path = request.path().to_owned();
            info!(%method, %path, "request received");

            let start = Instant::now();
            let response = next.run(request).await;

            info!(
                %method,
                %path,
                status = response.status().as_u16(),
                duration = ?start.elapsed(),
                "response sent"
            );
            response
        })
    }
}

/// Stamps every outgoing response with a [`DURATION_HEADER`].
///
/// Measures wall clock around the rest of the chain, so the header covers
/// cache hits and short-circuits from any stage sitting further in, as well
/// as full handler executions. Replaces rather than appends, in case a
/// cached snapshot already carries a stale measurement.
pub struct TimingStage;

impl Middleware for TimingStage {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let mut response = next.run(request).await;
            let millis = start.elapsed().as_secs_f64() * 1_000.0;
            response.set_header(DURATION_HEADER, format!("{millis:.3}"));
            response
        })
    }
}

/// Reports each completed request to an external performance collector.
///
/// The sample (method, path, status, duration, timestamp) is queued on the
/// injected dispatcher after the response is produced. Fire-and-forget: an
/// unreachable collector or a full queue never fails or delays the response.
pub struct MonitoringStage {
    dispatcher: NotificationDispatcher,
}

impl MonitoringStage {
    pub fn new(dispatcher: NotificationDispatcher) -> Self {
        Self { dispatcher }
    }
}

impl Middleware for MonitoringStage {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture {
        let dispatcher = self.dispatcher.clone();
        Box::pin(async move {
            let method = request.method().as_str().to_owned();
            let path = request.path().to_owned();

            let start = Instant::now();
            let response = next.run(request).await;
            let duration = start.elapsed().as_secs_f64();

            dispatcher.dispatch(Notification::performance_sample(
                &method,
                &path,
                response.status().as_u16(),
                duration,
            ));
            response
        })
    }
}
