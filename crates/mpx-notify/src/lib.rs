//! Notification dispatch for workflow events.
//!
//! Workflow code calls [`Notifier::notify`] after a transaction has
//! committed. The call never blocks and never fails: the notification is
//! pushed onto a bounded queue and a background worker hands it to a
//! [`NotificationSink`]. Sink errors and a full queue are logged and dropped;
//! they cannot reach the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    QuotationReceived,
    QuotationAccepted,
    QuotationRejected,
    OrderStatusChanged,
    PaymentUpdated,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::QuotationReceived => "quotation_received",
            NotificationKind::QuotationAccepted => "quotation_accepted",
            NotificationKind::QuotationRejected => "quotation_rejected",
            NotificationKind::OrderStatusChanged => "order_status_changed",
            NotificationKind::PaymentUpdated => "payment_updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Fire-and-forget entry point used by the workflow engine.
pub trait Notifier: Send + Sync {
    fn notify(&self, user_id: &str, kind: NotificationKind, payload: Value);
}

/// Final delivery target (push service, email relay, SSE bus, ...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Discards everything. For tools that run the engine without delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, user_id: &str, kind: NotificationKind, _payload: Value) {
        debug!(user_id, kind = kind.as_str(), "notification discarded");
    }
}

/// Sink that only writes a log line per notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, n: &Notification) -> anyhow::Result<()> {
        info!(user_id = %n.user_id, kind = n.kind.as_str(), "notification");
        Ok(())
    }
}

/// Fans notifications out to in-process subscribers (the daemon's SSE
/// stream). Having no subscriber is not a delivery failure.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn deliver(&self, n: &Notification) -> anyhow::Result<()> {
        if self.tx.send(n.clone()).is_err() {
            debug!(user_id = %n.user_id, kind = n.kind.as_str(), "no subscribers");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Delivery counters, readable while the worker runs.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl DispatchStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Notifications refused because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Queue-backed [`Notifier`]. Must be created inside a Tokio runtime.
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
    stats: Arc<DispatchStats>,
}

impl NotificationDispatcher {
    /// Start the delivery worker. The worker exits once every dispatcher
    /// handle is dropped and the queue is drained.
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));
        let stats = Arc::new(DispatchStats::default());
        let worker_stats = Arc::clone(&stats);

        let handle = tokio::spawn(async move {
            while let Some(n) = rx.recv().await {
                match sink.deliver(&n).await {
                    Ok(()) => {
                        worker_stats.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        worker_stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            user_id = %n.user_id,
                            kind = n.kind.as_str(),
                            error = %err,
                            "notification delivery failed; dropped"
                        );
                    }
                }
            }
            debug!("notification worker stopped");
        });

        (Self { tx, stats }, handle)
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }
}

impl Notifier for NotificationDispatcher {
    fn notify(&self, user_id: &str, kind: NotificationKind, payload: Value) {
        let n = Notification {
            user_id: user_id.to_string(),
            kind,
            payload,
            created_at: Utc::now(),
        };
        if let Err(err) = self.tx.try_send(n) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(user_id, kind = kind.as_str(), error = %err, "notification queue refused; dropped");
        }
    }
}
