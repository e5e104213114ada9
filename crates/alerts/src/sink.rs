//! Notification sinks.

use async_trait::async_trait;
use nimbus_common::{AlertEvent, AlertSeverity, NimbusError, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Receives alert events from the evaluator.
///
/// A failed delivery is reported back so the evaluator can retry on the next
/// pass instead of starting the cool-down.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &AlertEvent) -> Result<()>;
}

/// Writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        match event.severity {
            AlertSeverity::High | AlertSeverity::Critical => warn!(
                subscription_id = %event.subscription_id,
                location = %event.location,
                metric = %event.metric,
                severity = ?event.severity,
                "{}", event.summary()
            ),
            _ => info!(
                subscription_id = %event.subscription_id,
                location = %event.location,
                metric = %event.metric,
                severity = ?event.severity,
                "{}", event.summary()
            ),
        }
        Ok(())
    }
}

/// Forwards events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<AlertEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<AlertEvent>) -> Self {
        Self { tx }
    }

    /// A sink and the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| NimbusError::Agent("notification channel closed".into()))
    }
}

/// Keeps delivered events in memory, like an in-app inbox.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AlertEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Remove and return everything delivered so far.
    pub fn drain(&self) -> Vec<AlertEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
