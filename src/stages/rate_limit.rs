//! Per-client request throttling with abuse notification.

use std::sync::Arc;

use tracing::warn;

use crate::http::{Request, Response, StatusCode};
use crate::limit::RateLimitCounter;
use crate::notify::{Notification, NotificationDispatcher};
use crate::pipeline::{Middleware, Next, ResponseFuture};

/// Rejects clients whose request count within the current window has reached
/// the threshold.
///
/// The comparison is made against the COUNTER value for the client's window,
/// never against the request itself. A rejected request short-circuits with a
/// 429 and queues an excessive-requests notification on the dispatcher; the
/// response never waits for delivery. Admitted requests are counted before
/// the chain continues, so the threshold-th request still succeeds and the
/// one after it is the first rejection.
pub struct RateLimitStage {
    counter: Arc<RateLimitCounter>,
    threshold: u64,
    dispatcher: NotificationDispatcher,
}

impl RateLimitStage {
    pub fn new(
        counter: Arc<RateLimitCounter>,
        threshold: u64,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            counter,
            threshold,
            dispatcher,
        }
    }
}

impl Middleware for RateLimitStage {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture {
        let counter = Arc::clone(&self.counter);
        let threshold = self.threshold;
        let dispatcher = self.dispatcher.clone();
        Box::pin(async move {
            let client = request.remote_addr();

            if counter.count(client) >= threshold {
                warn!(ip = %client, threshold, "rate limit exceeded");
                dispatcher.dispatch(Notification::excessive_requests(client));
                return Response::error(StatusCode::TooManyRequests, "Too many requests");
            }

            counter.record(client);
            next.run(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::pipeline::Pipeline;
    use std::net::IpAddr;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn pipeline(
        threshold: u64,
        window: Duration,
    ) -> (Pipeline, mpsc::Receiver<Notification>) {
        let (dispatcher, rx) = NotificationDispatcher::channel(16);
        let stage = RateLimitStage::new(
            Arc::new(RateLimitCounter::new(window)),
            threshold,
            dispatcher,
        );
        let pipeline = Pipeline::builder()
            .stage(stage)
            .build(|_| async { Response::new(StatusCode::Ok) });
        (pipeline, rx)
    }

    fn from(ip: &str) -> Request {
        Request::builder(Method::Get, "/posts")
            .remote_addr(ip.parse().unwrap())
            .build()
    }

    #[tokio::test]
    async fn threshold_th_request_succeeds_and_next_is_rejected() {
        let (pipeline, mut rx) = pipeline(100, Duration::from_secs(3600));

        for _ in 0..100 {
            let response = pipeline.execute(from("10.0.0.1")).await;
            assert_eq!(response.status(), StatusCode::Ok);
        }

        let rejected = pipeline.execute(from("10.0.0.1")).await;
        assert_eq!(rejected.status(), StatusCode::TooManyRequests);
        assert_eq!(rejected.body_ref(), br#"{"error":"Too many requests"}"#);

        // The rejection queued exactly one abuse notification for that client.
        let queued = rx.try_recv().unwrap();
        match queued {
            Notification::ExcessiveRequests { ip, .. } => assert_eq!(ip, "10.0.0.1"),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn clients_are_throttled_independently() {
        let (pipeline, _rx) = pipeline(2, Duration::from_secs(3600));

        pipeline.execute(from("10.0.0.1")).await;
        pipeline.execute(from("10.0.0.1")).await;
        assert_eq!(
            pipeline.execute(from("10.0.0.1")).await.status(),
            StatusCode::TooManyRequests
        );
        assert_eq!(
            pipeline.execute(from("10.0.0.2")).await.status(),
            StatusCode::Ok
        );
    }

    #[tokio::test]
    async fn window_reset_readmits_the_client() {
        let (pipeline, _rx) = pipeline(1, Duration::from_millis(10));

        assert_eq!(pipeline.execute(from("10.0.0.1")).await.status(), StatusCode::Ok);
        assert_eq!(
            pipeline.execute(from("10.0.0.1")).await.status(),
            StatusCode::TooManyRequests
        );

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(pipeline.execute(from("10.0.0.1")).await.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn rejection_does_not_increment_the_counter() {
        let counter = Arc::new(RateLimitCounter::new(Duration::from_secs(3600)));
        let (dispatcher, _rx) = NotificationDispatcher::channel(16);
        let pipeline = Pipeline::builder()
            .stage(RateLimitStage::new(Arc::clone(&counter), 1, dispatcher))
            .build(|_| async { Response::new(StatusCode::Ok) });

        let client: IpAddr = "10.0.0.1".parse().unwrap();
        pipeline.execute(from("10.0.0.1")).await;
        pipeline.execute(from("10.0.0.1")).await;
        pipeline.execute(from("10.0.0.1")).await;
        assert_eq!(counter.count(client), 1);
    }
}
