//! Travel agent - per-destination conditions and packing advice.

use async_trait::async_trait;
use futures::future::join_all;
use nimbus_common::{
    Agent, AgentConfig, AgentOutput, ConditionCode, ConsensusReading, IntentTag, Query, Result,
};
use nimbus_fusion::{ConsensusFuser, SourceSet};
use nimbus_llm::{complete_prompt, LlmClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TRIP_DAYS: u32 = 7;

const TRAVEL_SYSTEM_PROMPT: &str = r#"You are a travel planning assistant. Given current
conditions for each destination, write a short, practical recommendation:
what to expect, what to pack, and any weather-related travel tips.
Do not invent forecasts beyond the data provided."#;

/// Builds trip reports from consensus readings, with optional model-written prose.
pub struct TravelAgent {
    config: AgentConfig,
    sources: SourceSet,
    fuser: ConsensusFuser,
    llm: Option<Arc<dyn LlmClient>>,
    llm_timeout: Duration,
    enabled: bool,
}

impl TravelAgent {
    pub fn new(config: AgentConfig, sources: SourceSet, fuser: ConsensusFuser) -> Self {
        Self {
            config,
            sources,
            fuser,
            llm: None,
            llm_timeout: Duration::from_secs(8),
            enabled: true,
        }
    }

    pub fn with_default_config(sources: SourceSet, fuser: ConsensusFuser) -> Self {
        Self::new(AgentConfig::new("travel", "Travel Agent"), sources, fuser)
    }

    /// Use a language model for the narrative; the template remains the fallback.
    pub fn with_llm(mut self, client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        self.llm = Some(client);
        self.llm_timeout = timeout;
        self
    }

    /// Turn the itinerary planner off. The hub then reports travel requests
    /// as degraded.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn system_prompt(&self) -> &str {
        self.config
            .system_prompt
            .as_deref()
            .unwrap_or(TRAVEL_SYSTEM_PROMPT)
    }

    async fn model_narrative(&self, query: &Query, template: &str) -> Option<String> {
        let client = self.llm.as_ref()?;
        let prompt = format!("Traveler asked: {}\n\nConditions:\n{}", query.raw_text, template);
        match complete_prompt(client.as_ref(), Some(self.system_prompt()), &prompt, self.llm_timeout).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(agent = %self.id(), error = %e, "Model narrative failed, using template");
                None
            }
        }
    }
}

/// Packing advice for one destination.
pub fn packing_tip(reading: &ConsensusReading) -> Option<&'static str> {
    let condition = reading.condition;
    if condition.is_wet() {
        Some("Pack rain gear and waterproof clothing")
    } else if condition.is_wintry() {
        Some("Pack warm winter clothing")
    } else if condition == ConditionCode::Clear || condition == ConditionCode::PartlyCloudy {
        Some("Pack sun protection and light clothing")
    } else if reading.temperature < 45.0 {
        Some("Pack warm layers")
    } else {
        None
    }
}

/// The template report used when no model is configured or it fails.
pub fn travel_report(readings: &[ConsensusReading], days: u32) -> String {
    let destinations: Vec<&str> = readings.iter().map(|r| r.location.as_str()).collect();
    let mut lines = vec![
        format!("Travel planning for {}", destinations.join(", ")),
        format!("Duration: {days} days"),
        String::new(),
    ];

    for reading in readings {
        if reading.is_unknown() {
            lines.push(format!("{}: could not get weather data", reading.location));
            continue;
        }
        lines.push(format!(
            "{}: {:.0}°F, {}, humidity {:.0}%, wind {:.0} mph ({:.0}% confidence)",
            reading.location,
            reading.temperature,
            reading.condition,
            reading.humidity,
            reading.wind_speed,
            reading.confidence_score * 100.0
        ));
        if let Some(tip) = packing_tip(reading) {
            lines.push(format!("  {tip}"));
        }
        if reading.condition.disrupts_travel() {
            lines.push("  Expect possible delays getting there".to_string());
        }
        lines.push(format!("  Plan around the weather for your {days}-day trip"));
    }

    lines.push(String::new());
    lines.push("Travel tips:".to_string());
    lines.extend(
        [
            "Check weather updates before departure",
            "Pack layers for temperature changes",
            "Monitor weather alerts for your travel dates",
        ]
        .iter()
        .map(|t| format!("  - {t}")),
    );
    lines.join("\n")
}

#[async_trait]
impl Agent for TravelAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn capability(&self) -> IntentTag {
        IntentTag::Travel
    }

    async fn handle(&self, query: &Query) -> Result<AgentOutput> {
        if query.extracted_locations.is_empty() {
            return Ok(AgentOutput::clarification(
                self.id(),
                self.capability(),
                "Where are you traveling to?",
            ));
        }

        let days = query.trip_days.unwrap_or(DEFAULT_TRIP_DAYS);
        info!(
            agent = %self.id(),
            destinations = query.extracted_locations.len(),
            days,
            "Planning trip"
        );

        let weights = &self.fuser.config().source_reliability;
        let outcomes = join_all(
            query
                .extracted_locations
                .iter()
                .map(|location| self.sources.gather(location, None, &self.fuser, Some(weights))),
        )
        .await;

        let mut output = AgentOutput::new(self.id(), self.capability(), String::new());
        let mut readings = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            output.soft_failures.extend(outcome.failures);
            readings.push(outcome.reading);
        }

        let template = travel_report(&readings, days);
        output.narrative = match self.model_narrative(query, &template).await {
            Some(prose) => prose,
            None => template,
        };
        debug!(agent = %self.id(), chars = output.narrative.len(), "Travel report ready");

        output.recommendations = readings
            .iter()
            .filter_map(|r| packing_tip(r).map(|tip| format!("{}: {}", r.location, tip)))
            .collect();
        output.readings = readings.into_iter().filter(|r| !r.is_unknown()).collect();
        Ok(output)
    }

    fn is_available(&self) -> bool {
        self.enabled && !self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nimbus_common::{Location, ReadingStatus};

    fn reading(location: &str, condition: ConditionCode) -> ConsensusReading {
        let mut r = ConsensusReading::unknown(Location::named(location), Utc::now());
        r.temperature = 64.0;
        r.condition = condition;
        r.humidity = 60.0;
        r.confidence_score = 0.82;
        r.status = ReadingStatus::Consensus;
        r
    }

    #[test]
    fn test_packing_tips() {
        assert_eq!(packing_tip(&reading("Rome", ConditionCode::Rain)), Some("Pack rain gear and waterproof clothing"));
        assert_eq!(packing_tip(&reading("Oslo", ConditionCode::Snow)), Some("Pack warm winter clothing"));
        assert_eq!(packing_tip(&reading("Nice", ConditionCode::Clear)), Some("Pack sun protection and light clothing"));
        assert_eq!(packing_tip(&reading("Bern", ConditionCode::Cloudy)), None);
    }

    #[test]
    fn test_configured_prompt_overrides_default() {
        let sources = SourceSet::new(std::time::Duration::from_secs(1));
        let default = TravelAgent::with_default_config(sources.clone(), ConsensusFuser::default());
        assert_eq!(default.system_prompt(), TRAVEL_SYSTEM_PROMPT);

        let custom = TravelAgent::new(
            AgentConfig::new("travel", "Travel Agent").with_system_prompt("Answer in one sentence."),
            sources,
            ConsensusFuser::default(),
        );
        assert_eq!(custom.system_prompt(), "Answer in one sentence.");
    }

    #[test]
    fn test_report_lists_destinations_and_duration() {
        let report = travel_report(
            &[
                reading("Tokyo", ConditionCode::Rain),
                ConsensusReading::unknown(Location::named("Kyoto"), Utc::now()),
            ],
            3,
        );
        assert!(report.starts_with("Travel planning for Tokyo, Kyoto"));
        assert!(report.contains("Duration: 3 days"));
        assert!(report.contains("Kyoto: could not get weather data"));
        assert!(report.contains("Travel tips:"));
    }
}
