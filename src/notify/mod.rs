//! Fire-and-forget delivery of webhook-style notifications.
//!
//! Stages hand payloads to a [`NotificationDispatcher`], which queues them on
//! a bounded channel drained by a detached worker task. The worker POSTs each
//! payload as JSON to the configured collector. Nothing on the response path
//! ever waits for delivery: a full queue drops the new payload (logged), and
//! delivery failures are logged, never surfaced.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default capacity of the dispatch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A webhook-style event payload.
///
/// Serialized as JSON with an `event` discriminator, e.g.
/// `{"event":"excessive_requests","ip":"10.0.0.1",...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// A client exceeded the rate-limit threshold.
    ExcessiveRequests {
        ip: String,
        message: String,
        timestamp: f64,
    },
    /// One request's performance measurement.
    PerformanceSample {
        method: String,
        path: String,
        status_code: u16,
        response_time: f64,
        timestamp: f64,
    },
}

impl Notification {
    /// Builds an abuse notification for the given client address.
    pub fn excessive_requests(ip: std::net::IpAddr) -> Self {
        Self::ExcessiveRequests {
            ip: ip.to_string(),
            message: "Too many requests from this IP".to_owned(),
            timestamp: unix_now(),
        }
    }

    /// Builds a performance sample for a completed request.
    pub fn performance_sample(
        method: &str,
        path: &str,
        status_code: u16,
        response_time_secs: f64,
    ) -> Self {
        Self::PerformanceSample {
            method: method.to_owned(),
            path: path.to_owned(),
            status_code,
            response_time: response_time_secs,
            timestamp: unix_now(),
        }
    }

    /// Returns the event kind as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExcessiveRequests { .. } => "excessive_requests",
            Self::PerformanceSample { .. } => "performance_sample",
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Hands notifications off the response critical path.
///
/// Cloning is cheap; every stage that reports events holds its own handle to
/// the same queue. The worker task spawned by [`spawn`](Self::spawn) lives
/// independently of any request, so an abandoned (timed-out) request never
/// cancels an already-queued delivery.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher and a detached worker that POSTs queued payloads.
    ///
    /// Abuse notifications go to `notify_url`, performance samples to
    /// `monitoring_url`; a payload whose collector is unconfigured is
    /// silently discarded. Must be called within a Tokio runtime.
    pub fn spawn(
        notify_url: Option<String>,
        monitoring_url: Option<String>,
        capacity: usize,
    ) -> Self {
        let (dispatcher, mut rx) = Self::channel(capacity);
        let client = reqwest::Client::new();

        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                deliver(&client, notify_url.as_deref(), monitoring_url.as_deref(), notification)
                    .await;
            }
        });

        dispatcher
    }

    /// Creates a dispatcher together with the receiving end of its queue.
    ///
    /// [`spawn`](Self::spawn) uses this internally; tests use it to observe
    /// what stages enqueue without any network I/O.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queues a notification without blocking.
    ///
    /// A full queue drops the new payload; a closed queue (worker gone) drops
    /// it too. Both cases are logged and neither reaches the caller.
    pub fn dispatch(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(event = dropped.kind(), "notification queue full, dropping payload");
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                warn!(event = dropped.kind(), "notification worker gone, dropping payload");
            }
        }
    }
}

/// POSTs one payload to its collector. Failures are logged and swallowed.
async fn deliver(
    client: &reqwest::Client,
    notify_url: Option<&str>,
    monitoring_url: Option<&str>,
    notification: Notification,
) {
    let url = match &notification {
        Notification::ExcessiveRequests { .. } => notify_url,
        Notification::PerformanceSample { .. } => monitoring_url,
    };
    let Some(url) = url else {
        return;
    };

    match client.post(url).json(&notification).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(event = notification.kind(), "notification delivered");
        }
        Ok(response) => {
            warn!(
                event = notification.kind(),
                status = response.status().as_u16(),
                "collector rejected notification"
            );
        }
        Err(e) => {
            warn!(event = notification.kind(), error = %e, "failed to deliver notification");
        }
    }
}
