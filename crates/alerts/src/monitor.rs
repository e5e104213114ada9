//! Background evaluation loop.

use crate::evaluator::AlertEvaluator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Counters returned when the monitor stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub passes: u64,
    pub failed_passes: u64,
    pub events: u64,
}

/// Runs [`AlertEvaluator::evaluate_all`] every `check_interval`.
pub struct AlertMonitor {
    evaluator: Arc<AlertEvaluator>,
    check_interval: Duration,
    error_backoff: Duration,
}

/// Handle to a running monitor.
pub struct MonitorHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<MonitorStats>,
}

impl MonitorHandle {
    /// Signal the loop to stop and wait for it.
    pub async fn shutdown(self) -> MonitorStats {
        let _ = self.shutdown_tx.send(()).await;
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Alert monitor task failed");
                MonitorStats::default()
            }
        }
    }
}

impl AlertMonitor {
    pub fn new(evaluator: Arc<AlertEvaluator>, check_interval: Duration, error_backoff: Duration) -> Self {
        Self {
            evaluator,
            check_interval,
            error_backoff,
        }
    }

    /// Spawn the loop. The first pass runs immediately.
    pub fn start(self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(self.run(shutdown_rx));
        MonitorHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) -> MonitorStats {
        info!(
            interval_secs = self.check_interval.as_secs(),
            "Alert monitor started"
        );
        let mut stats = MonitorStats::default();

        loop {
            let delay = match self.evaluator.evaluate_all().await {
                Ok(outcomes) => {
                    let events: usize = outcomes.iter().map(|o| o.events.len()).sum();
                    stats.passes += 1;
                    stats.events += events as u64;
                    info!(subscriptions = outcomes.len(), events, "Monitor pass complete");
                    self.check_interval
                }
                Err(e) => {
                    stats.failed_passes += 1;
                    error!(error = %e, backoff_secs = self.error_backoff.as_secs(), "Monitor pass failed");
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(passes = stats.passes, events = stats.events, "Alert monitor stopped");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::ConditionsProvider;
    use crate::sink::MemorySink;
    use crate::store::{InMemorySubscriptionStore, SubscriptionStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use nimbus_common::{
        AlertSubscription, ConditionCode, ConsensusReading, Location, NewSubscription,
        NimbusError, ReadingStatus, Result,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Hot;

    #[async_trait]
    impl ConditionsProvider for Hot {
        async fn current_conditions(&self, location: &Location) -> Result<ConsensusReading> {
            let mut r = ConsensusReading::unknown(location.clone(), Utc::now());
            r.temperature = 100.0;
            r.condition = ConditionCode::Clear;
            r.confidence_score = 0.9;
            r.status = ReadingStatus::SingleSource;
            Ok(r)
        }
    }

    /// Store whose `list_all` fails the first `failures` times.
    struct FlakyStore {
        inner: InMemorySubscriptionStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl SubscriptionStore for FlakyStore {
        async fn create(&self, request: NewSubscription) -> Result<AlertSubscription> {
            self.inner.create(request).await
        }
        async fn get(&self, id: &str) -> Result<AlertSubscription> {
            self.inner.get(id).await
        }
        async fn list_by_owner(&self, owner: &str) -> Result<Vec<AlertSubscription>> {
            self.inner.list_by_owner(owner).await
        }
        async fn list_all(&self) -> Result<Vec<AlertSubscription>> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(NimbusError::Agent("store offline".into()));
            }
            self.inner.list_all().await
        }
        async fn update_timestamps(
            &self,
            id: &str,
            evaluated_at: DateTime<Utc>,
            triggered_at: Option<DateTime<Utc>>,
        ) -> Result<AlertSubscription> {
            self.inner.update_timestamps(id, evaluated_at, triggered_at).await
        }
        async fn update(&self, subscription: AlertSubscription) -> Result<AlertSubscription> {
            self.inner.update(subscription).await
        }
        async fn delete(&self, id: &str) -> Result<()> {
            self.inner.delete(id).await
        }
        async fn delete_by_owner(&self, owner: &str) -> Result<usize> {
            self.inner.delete_by_owner(owner).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_after_failure_then_keeps_interval() {
        let store = Arc::new(FlakyStore {
            inner: InMemorySubscriptionStore::new(),
            failures: AtomicUsize::new(1),
        });
        store
            .create(NewSubscription {
                owner: "ana".into(),
                locations: vec!["Phoenix".into()],
                thresholds: HashMap::from([("temperature_high".to_string(), 90.0)]),
                ..Default::default()
            })
            .await
            .unwrap();

        let sink = Arc::new(MemorySink::new());
        let evaluator = Arc::new(AlertEvaluator::new(
            store,
            Arc::new(Hot),
            sink.clone(),
            Duration::from_secs(3600),
        ));

        let handle = AlertMonitor::new(evaluator, Duration::from_secs(1800), Duration::from_secs(60)).start();

        // failed pass at t=0, retry after the 60s backoff
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(sink.len(), 1);

        // next pass at t=1860 is inside the cool-down
        tokio::time::sleep(Duration::from_secs(1800)).await;
        let stats = handle.shutdown().await;

        assert_eq!(stats.failed_passes, 1);
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.events, 1);
        assert_eq!(sink.len(), 1);
    }
}
