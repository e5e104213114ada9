//! Intelligence agent - multi-source consensus and reliability reporting.

use async_trait::async_trait;
use futures::future::join_all;
use nimbus_alerts::ConditionsProvider;
use nimbus_common::{
    Agent, AgentConfig, AgentOutput, ConsensusReading, IntentTag, Location, NimbusError, Query,
    Result,
};
use nimbus_fusion::{ConsensusFuser, GatherOutcome, SourceSet};
use std::collections::HashMap;
use tracing::{info, warn};

const HIGH_CONFIDENCE: f64 = 0.8;
const MEDIUM_CONFIDENCE: f64 = 0.6;
/// Spread that earns an explicit note in the report.
const NOTABLE_VARIATION_F: f64 = 10.0;

/// Gathers every source for each location and reports the fused reading.
///
/// Also serves as the alert evaluator's [`ConditionsProvider`].
pub struct IntelligenceAgent {
    config: AgentConfig,
    sources: SourceSet,
    fuser: ConsensusFuser,
}

impl IntelligenceAgent {
    pub fn new(config: AgentConfig, sources: SourceSet, fuser: ConsensusFuser) -> Self {
        Self {
            config,
            sources,
            fuser,
        }
    }

    pub fn with_default_config(sources: SourceSet, fuser: ConsensusFuser) -> Self {
        Self::new(
            AgentConfig::new("intelligence", "Weather Intelligence Agent"),
            sources,
            fuser,
        )
    }

    fn weights(&self) -> Option<&HashMap<String, f64>> {
        let reliability = &self.fuser.config().source_reliability;
        (!reliability.is_empty()).then_some(reliability)
    }

    /// Gather and fuse one location.
    pub async fn consensus(&self, location: &Location) -> GatherOutcome {
        self.sources
            .gather(location, None, &self.fuser, self.weights())
            .await
    }
}

/// Human-readable analysis of one consensus reading.
pub fn intelligence_report(reading: &ConsensusReading) -> String {
    if reading.is_unknown() {
        return format!("{}: no source could report current conditions", reading.location);
    }

    let sources: Vec<&str> = reading.contributing_sources.iter().map(String::as_str).collect();
    let mut lines = vec![
        format!("Weather intelligence for {}", reading.location),
        format!("Data sources: {} ({})", sources.len(), sources.join(", ")),
        format!("Confidence: {:.0}%", reading.confidence_score * 100.0),
        format!(
            "Consensus: {:.1}°F, {}, wind {:.0} mph, humidity {:.0}%",
            reading.temperature, reading.condition, reading.wind_speed, reading.humidity
        ),
    ];

    lines.push(
        if reading.confidence_score > HIGH_CONFIDENCE {
            "High confidence: sources in good agreement"
        } else if reading.confidence_score > MEDIUM_CONFIDENCE {
            "Medium confidence: some variation between sources"
        } else {
            "Lower confidence: significant variation between sources"
        }
        .to_string(),
    );

    if reading.spreads.temperature > NOTABLE_VARIATION_F {
        lines.push(format!(
            "Temperature variation: {:.1}°F across sources",
            reading.spreads.temperature
        ));
    }

    lines.join("\n")
}

/// Planning advice from a fused reading. Never empty.
pub fn forecast_recommendations(reading: &ConsensusReading) -> Vec<String> {
    let mut advice = Vec::new();

    if reading.temperature > 80.0 {
        advice.push("Hot weather expected: stay hydrated and seek shade".to_string());
    } else if reading.temperature < 40.0 {
        advice.push("Cold weather: dress warmly and check for ice".to_string());
    }

    if reading.confidence_score < 0.7 {
        advice.push("Forecast confidence is lower: check again closer to your plans".to_string());
    } else {
        advice.push("High confidence forecast: good for planning outdoor activities".to_string());
    }

    if reading.condition.is_wet() {
        advice.push("Rain expected: carry an umbrella".to_string());
    } else if reading.condition.is_wintry() {
        advice.push("Snow or ice: allow extra travel time".to_string());
    }

    advice
}

#[async_trait]
impl ConditionsProvider for IntelligenceAgent {
    async fn current_conditions(&self, location: &Location) -> Result<ConsensusReading> {
        let outcome = self.consensus(location).await;
        if outcome.reading.is_unknown() {
            let reasons: Vec<String> = outcome.failures.iter().map(|f| f.reason.clone()).collect();
            return Err(NimbusError::InsufficientData(format!(
                "no source reported conditions for {location}: {}",
                reasons.join("; ")
            )));
        }
        Ok(outcome.reading)
    }
}

#[async_trait]
impl Agent for IntelligenceAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn capability(&self) -> IntentTag {
        IntentTag::Intelligence
    }

    async fn handle(&self, query: &Query) -> Result<AgentOutput> {
        if query.extracted_locations.is_empty() {
            return Ok(AgentOutput::clarification(
                self.id(),
                self.capability(),
                "Which location should I compare sources for?",
            ));
        }

        info!(
            agent = %self.id(),
            locations = query.extracted_locations.len(),
            sources = self.sources.sources().len(),
            "Building consensus"
        );

        let outcomes = join_all(
            query
                .extracted_locations
                .iter()
                .map(|location| self.consensus(location)),
        )
        .await;

        let mut output = AgentOutput::new(self.id(), self.capability(), String::new());
        let mut sections = Vec::new();

        for outcome in outcomes {
            let reading = outcome.reading;
            sections.push(intelligence_report(&reading));
            output.soft_failures.extend(outcome.failures);

            if reading.is_unknown() {
                warn!(agent = %self.id(), location = %reading.location, "No consensus available");
                continue;
            }
            for advice in forecast_recommendations(&reading) {
                if !output.recommendations.contains(&advice) {
                    output.recommendations.push(advice);
                }
            }
            output.observations.extend(outcome.observations);
            output.readings.push(reading);
        }

        output.narrative = sections.join("\n\n");
        Ok(output)
    }

    fn is_available(&self) -> bool {
        !self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nimbus_common::{ConditionCode, ReadingStatus};

    fn reading(confidence: f64, temp_spread: f64) -> ConsensusReading {
        let mut r = ConsensusReading::unknown(Location::named("Denver"), Utc::now());
        r.temperature = 72.0;
        r.condition = ConditionCode::Rain;
        r.confidence_score = confidence;
        r.contributing_sources = ["nws", "wttr"].iter().map(|s| s.to_string()).collect();
        r.spreads.temperature = temp_spread;
        r.spread = temp_spread;
        r.status = ReadingStatus::Consensus;
        r
    }

    #[test]
    fn test_report_confidence_bands() {
        assert!(intelligence_report(&reading(0.9, 1.0)).contains("High confidence"));
        assert!(intelligence_report(&reading(0.7, 3.0)).contains("Medium confidence"));
        let low = intelligence_report(&reading(0.3, 12.0));
        assert!(low.contains("Lower confidence"));
        assert!(low.contains("Temperature variation: 12.0°F"));
    }

    #[test]
    fn test_report_for_unknown_reading() {
        let unknown = ConsensusReading::unknown(Location::named("Denver"), Utc::now());
        assert!(intelligence_report(&unknown).contains("no source"));
    }

    #[test]
    fn test_forecast_recommendations() {
        let advice = forecast_recommendations(&reading(0.5, 0.0));
        assert!(advice.iter().any(|a| a.contains("check again")));
        assert!(advice.iter().any(|a| a.contains("umbrella")));
    }
}
