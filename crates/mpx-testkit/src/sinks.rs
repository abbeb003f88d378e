use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mpx_notify::{Notification, NotificationKind, NotificationSink, Notifier};
use serde_json::Value;

/// Synchronous [`Notifier`] that keeps every call in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, NotificationKind, Value)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, NotificationKind, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Recipients of every call of `kind`, in call order.
    pub fn recipients(&self, kind: NotificationKind) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(u, _, _)| u)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut c) = self.calls.lock() {
            c.clear();
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user_id: &str, kind: NotificationKind, payload: Value) {
        if let Ok(mut c) = self.calls.lock() {
            c.push((user_id.to_string(), kind, payload));
        }
    }
}

/// [`NotificationSink`] that records deliveries.
#[derive(Default)]
pub struct RecordingSink {
    delivered: tokio::sync::Mutex<Vec<Notification>>,
    signal: tokio::sync::Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().await.clone()
    }

    /// Wait until at least `n` notifications were delivered or `timeout`
    /// elapses; returns what was delivered either way.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> Vec<Notification> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.signal.notified();
            {
                let got = self.delivered.lock().await;
                if got.len() >= n {
                    return got.clone();
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.delivered.lock().await.clone();
            }
        }
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        self.delivered.lock().await.push(notification.clone());
        self.signal.notify_waiters();
        Ok(())
    }
}

/// Sink whose every delivery fails.
#[derive(Debug, Default)]
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn deliver(&self, _notification: &Notification) -> anyhow::Result<()> {
        anyhow::bail!("injected delivery failure")
    }
}
