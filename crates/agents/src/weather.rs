//! Weather agent - current conditions from the primary source.

use async_trait::async_trait;
use futures::future::join_all;
use nimbus_common::{
    Agent, AgentConfig, AgentOutput, IntentTag, Observation, Query, Result, SoftFailure,
};
use nimbus_fusion::SourceSet;
use tracing::info;

/// Reports current conditions from a single source per location.
///
/// Sources are tried in registration order; the first to answer wins.
pub struct WeatherAgent {
    config: AgentConfig,
    sources: SourceSet,
}

impl WeatherAgent {
    pub fn new(config: AgentConfig, sources: SourceSet) -> Self {
        Self { config, sources }
    }

    pub fn with_default_config(sources: SourceSet) -> Self {
        Self::new(AgentConfig::new("weather", "Weather Agent"), sources)
    }
}

fn describe(observation: &Observation) -> String {
    format!(
        "{}: {:.0}°F, {}, wind {:.0} mph, humidity {:.0}% (source: {})",
        observation.location,
        observation.temperature,
        observation.condition_code,
        observation.wind_speed,
        observation.humidity,
        observation.source_id
    )
}

#[async_trait]
impl Agent for WeatherAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn capability(&self) -> IntentTag {
        IntentTag::Weather
    }

    async fn handle(&self, query: &Query) -> Result<AgentOutput> {
        if query.extracted_locations.is_empty() {
            return Ok(AgentOutput::clarification(
                self.id(),
                self.capability(),
                "Which location would you like the weather for?",
            ));
        }

        info!(
            agent = %self.id(),
            locations = query.extracted_locations.len(),
            "Fetching current conditions"
        );

        let mut output = AgentOutput::new(self.id(), self.capability(), String::new());
        let mut lines = Vec::new();

        let lookups = query.extracted_locations.iter().map(|location| async move {
            (location, self.sources.first_available(location, None).await)
        });

        for (location, result) in join_all(lookups).await {
            match result {
                Ok((observation, failures)) => {
                    lines.push(describe(&observation));
                    output.observations.push(observation);
                    output.soft_failures.extend(failures);
                }
                Err(e) => {
                    lines.push(format!("{location}: weather data unavailable"));
                    output.soft_failures.push(
                        SoftFailure::new(format!("agent:{}", self.id()), e.to_string())
                            .for_target(location.as_str()),
                    );
                }
            }
        }

        output.narrative = lines.join("\n");
        Ok(output)
    }

    fn is_available(&self) -> bool {
        !self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_common::{ConditionCode, Location};
    use nimbus_fusion::StaticSource;
    use std::sync::Arc;
    use std::time::Duration;

    fn agent() -> WeatherAgent {
        let sources = SourceSet::new(Duration::from_secs(1))
            .with_source(Arc::new(
                StaticSource::new("nws").with_reading("London", 58.0, ConditionCode::Drizzle, 9.0, 88.0),
            ))
            .with_source(Arc::new(
                StaticSource::new("wttr")
                    .with_reading("London", 60.0, ConditionCode::Rain, 10.0, 90.0)
                    .with_reading("Paris", 66.0, ConditionCode::Clear, 4.0, 55.0),
            ));
        WeatherAgent::with_default_config(sources)
    }

    #[tokio::test]
    async fn test_primary_source_answers_first() {
        let mut query = Query::new("What's the weather in London?");
        query.extracted_locations.push(Location::named("London"));

        let output = agent().handle(&query).await.unwrap();
        assert_eq!(output.observations.len(), 1);
        assert_eq!(output.observations[0].source_id, "nws");
        assert!(output.narrative.contains("London: 58°F, Drizzle"));
    }

    #[tokio::test]
    async fn test_falls_through_to_next_source() {
        let mut query = Query::new("weather in Paris");
        query.extracted_locations.push(Location::named("Paris"));

        let output = agent().handle(&query).await.unwrap();
        assert_eq!(output.observations[0].source_id, "wttr");
        assert_eq!(output.soft_failures.len(), 1);
    }

    #[tokio::test]
    async fn test_no_location_asks_for_one() {
        let output = agent().handle(&Query::new("weather?")).await.unwrap();
        assert!(output.needs_clarification);
        assert!(output.observations.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_locations_fetched_concurrently() {
        let slow = StaticSource::new("nws")
            .with_reading("London", 58.0, ConditionCode::Drizzle, 9.0, 88.0)
            .with_reading("Paris", 66.0, ConditionCode::Clear, 4.0, 55.0)
            .with_reading("Rome", 75.0, ConditionCode::Clear, 3.0, 40.0)
            .with_delay(Duration::from_millis(800));
        let agent = WeatherAgent::with_default_config(
            SourceSet::new(Duration::from_secs(1)).with_source(Arc::new(slow)),
        );

        let mut query = Query::new("weather in London, Paris and Rome");
        for city in ["London", "Paris", "Rome"] {
            query.extracted_locations.push(Location::named(city));
        }

        let started = tokio::time::Instant::now();
        let output = agent.handle(&query).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        let order: Vec<&str> = output.observations.iter().map(|o| o.location.as_str()).collect();
        assert_eq!(order, vec!["London", "Paris", "Rome"]);
        assert!(output.soft_failures.is_empty());
    }
}
