//! A fixture-backed observation source.
//!
//! Used by the demo binary and by tests. Live provider adapters are out of
//! scope; anything implementing [`ObservationSource`] can replace this.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nimbus_common::{
    ConditionCode, Location, NimbusError, Observation, ObservationSource, Result,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Fixture {
    temperature: f64,
    condition: ConditionCode,
    wind_speed: f64,
    humidity: f64,
}

/// Serves canned readings keyed by location.
#[derive(Debug, Clone)]
pub struct StaticSource {
    id: String,
    readings: HashMap<Location, Fixture>,
    failing: HashSet<Location>,
    always_fail: bool,
    raw_confidence: Option<f64>,
    delay: Option<Duration>,
}

impl StaticSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            readings: HashMap::new(),
            failing: HashSet::new(),
            always_fail: false,
            raw_confidence: None,
            delay: None,
        }
    }

    /// A source that fails every fetch.
    pub fn unavailable(id: impl Into<String>) -> Self {
        let mut source = Self::new(id);
        source.always_fail = true;
        source
    }

    pub fn with_reading(
        mut self,
        location: &str,
        temperature: f64,
        condition: ConditionCode,
        wind_speed: f64,
        humidity: f64,
    ) -> Self {
        self.readings.insert(
            Location::named(location),
            Fixture {
                temperature,
                condition,
                wind_speed,
                humidity,
            },
        );
        self
    }

    /// Fail fetches for one location only.
    pub fn unavailable_for(mut self, location: &str) -> Self {
        self.failing.insert(Location::named(location));
        self
    }

    pub fn with_raw_confidence(mut self, confidence: f64) -> Self {
        self.raw_confidence = Some(confidence);
        self
    }

    /// Wait before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ObservationSource for StaticSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, location: &Location, as_of: Option<DateTime<Utc>>) -> Result<Observation> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.always_fail || self.failing.contains(location) {
            return Err(NimbusError::source_unavailable(&self.id, "service unavailable"));
        }

        let fixture = self.readings.get(location).ok_or_else(|| {
            NimbusError::source_unavailable(&self.id, format!("no data for {location}"))
        })?;

        let mut observation = Observation::new(self.id.clone(), location.clone(), fixture.temperature)
            .with_condition(fixture.condition)
            .with_wind_speed(fixture.wind_speed)
            .with_humidity(fixture.humidity)
            .at(as_of.unwrap_or_else(Utc::now));
        if let Some(confidence) = self.raw_confidence {
            observation = observation.with_raw_confidence(confidence);
        }
        Ok(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_fixture_and_fails_unknown_locations() {
        let source = StaticSource::new("nws")
            .with_reading("Boston", 61.0, ConditionCode::Fog, 4.0, 92.0)
            .with_raw_confidence(0.9);

        let obs = source.fetch(&Location::named("boston"), None).await.unwrap();
        assert_eq!(obs.temperature, 61.0);
        assert_eq!(obs.condition_code, ConditionCode::Fog);
        assert_eq!(obs.raw_confidence, Some(0.9));

        let err = source.fetch(&Location::named("Lima"), None).await.unwrap_err();
        assert!(matches!(err, NimbusError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn per_location_outage() {
        let source = StaticSource::new("wttr")
            .with_reading("Boston", 61.0, ConditionCode::Clear, 4.0, 50.0)
            .unavailable_for("Boston");
        assert!(source.fetch(&Location::named("Boston"), None).await.is_err());
    }
}
