//! Concurrent fetch across observation sources.

use crate::fuser::ConsensusFuser;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use nimbus_common::{
    ConsensusReading, Location, NimbusError, Observation, ObservationSource, Result, SoftFailure,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of gathering and fusing one location.
#[derive(Debug, Clone)]
pub struct GatherOutcome {
    pub reading: ConsensusReading,
    pub observations: Vec<Observation>,
    /// One entry per source that failed or timed out.
    pub failures: Vec<SoftFailure>,
}

/// The set of sources queried for a consensus reading.
#[derive(Clone)]
pub struct SourceSet {
    sources: Vec<Arc<dyn ObservationSource>>,
    timeout: Duration,
}

impl SourceSet {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            timeout,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ObservationSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn sources(&self) -> &[Arc<dyn ObservationSource>] {
        &self.sources
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Fetch every source concurrently, each bounded by the set's timeout.
    ///
    /// Successful observations come back in source registration order.
    pub async fn fetch_all(
        &self,
        location: &Location,
        as_of: Option<DateTime<Utc>>,
    ) -> (Vec<Observation>, Vec<SoftFailure>) {
        let futures = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            let location = location.clone();
            let timeout = self.timeout;
            async move {
                let id = source.source_id().to_string();
                let result = match tokio::time::timeout(timeout, source.fetch(&location, as_of)).await {
                    Ok(result) => result,
                    Err(_) => Err(NimbusError::source_unavailable(
                        &id,
                        format!("timed out after {}ms", timeout.as_millis()),
                    )),
                };
                (id, result)
            }
        });

        let mut observations = Vec::new();
        let mut failures = Vec::new();
        for (id, result) in join_all(futures).await {
            match result {
                Ok(observation) => {
                    debug!(source = %id, location = %location, temperature = observation.temperature, "Observation received");
                    observations.push(observation);
                }
                Err(e) => {
                    warn!(source = %id, location = %location, error = %e, "Source failed");
                    failures.push(
                        SoftFailure::new(format!("source:{id}"), e.to_string())
                            .for_target(location.as_str()),
                    );
                }
            }
        }
        (observations, failures)
    }

    /// Gather from every source and fuse what came back.
    ///
    /// Never fails: with zero successes the reading is
    /// [`ConsensusReading::unknown`] and every failure is listed.
    pub async fn gather(
        &self,
        location: &Location,
        as_of: Option<DateTime<Utc>>,
        fuser: &ConsensusFuser,
        weights: Option<&HashMap<String, f64>>,
    ) -> GatherOutcome {
        let (observations, failures) = self.fetch_all(location, as_of).await;

        let reading = match fuser.fuse(&observations, weights) {
            Ok(reading) => reading,
            Err(_) => ConsensusReading::unknown(location.clone(), as_of.unwrap_or_else(Utc::now)),
        };

        debug!(
            location = %location,
            sources = reading.source_count(),
            failed = failures.len(),
            confidence = reading.confidence_score,
            "Consensus gathered"
        );

        GatherOutcome {
            reading,
            observations,
            failures,
        }
    }

    /// Fetch from the first source that answers, in registration order.
    pub async fn first_available(
        &self,
        location: &Location,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<(Observation, Vec<SoftFailure>)> {
        let mut failures = Vec::new();
        for source in &self.sources {
            let id = source.source_id();
            match tokio::time::timeout(self.timeout, source.fetch(location, as_of)).await {
                Ok(Ok(observation)) => return Ok((observation, failures)),
                Ok(Err(e)) => failures.push(
                    SoftFailure::new(format!("source:{id}"), e.to_string())
                        .for_target(location.as_str()),
                ),
                Err(_) => failures.push(
                    SoftFailure::new(format!("source:{id}"), "timed out").for_target(location.as_str()),
                ),
            }
        }
        Err(NimbusError::InsufficientData(format!(
            "no source could report conditions for {location}"
        )))
    }
}

impl std::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSet")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.source_id()).collect::<Vec<_>>(),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticSource;
    use nimbus_common::{ConditionCode, ReadingStatus};

    fn source(id: &str, temp: f64) -> Arc<dyn ObservationSource> {
        Arc::new(StaticSource::new(id).with_reading("Seattle", temp, ConditionCode::Rain, 10.0, 80.0))
    }

    #[tokio::test]
    async fn failed_source_is_a_soft_failure() {
        let set = SourceSet::new(Duration::from_secs(1))
            .with_source(source("nws", 55.0))
            .with_source(Arc::new(StaticSource::unavailable("wttr")))
            .with_source(source("mcp", 57.0));

        let outcome = set
            .gather(&Location::named("Seattle"), None, &ConsensusFuser::default(), None)
            .await;

        assert_eq!(outcome.reading.source_count(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].component, "source:wttr");
        assert_eq!(outcome.failures[0].target.as_deref(), Some("Seattle"));
    }

    #[tokio::test]
    async fn zero_successes_yield_unknown_reading() {
        let set = SourceSet::new(Duration::from_secs(1))
            .with_source(Arc::new(StaticSource::unavailable("nws")))
            .with_source(Arc::new(StaticSource::unavailable("wttr")));

        let outcome = set
            .gather(&Location::named("Seattle"), None, &ConsensusFuser::default(), None)
            .await;

        assert_eq!(outcome.reading.status, ReadingStatus::Unknown);
        assert_eq!(outcome.reading.confidence_score, 0.0);
        assert_eq!(outcome.failures.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_times_out() {
        let slow = StaticSource::new("slow")
            .with_reading("Seattle", 50.0, ConditionCode::Cloudy, 5.0, 70.0)
            .with_delay(Duration::from_secs(30));
        let set = SourceSet::new(Duration::from_secs(2))
            .with_source(source("nws", 55.0))
            .with_source(Arc::new(slow));

        let outcome = set
            .gather(&Location::named("Seattle"), None, &ConsensusFuser::default(), None)
            .await;

        assert_eq!(outcome.reading.status, ReadingStatus::SingleSource);
        assert!(outcome.failures[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn first_available_skips_failures() {
        let set = SourceSet::new(Duration::from_secs(1))
            .with_source(Arc::new(StaticSource::unavailable("nws")))
            .with_source(source("wttr", 52.0));

        let (observation, failures) = set
            .first_available(&Location::named("seattle"), None)
            .await
            .unwrap();
        assert_eq!(observation.source_id, "wttr");
        assert_eq!(failures.len(), 1);
    }
}
