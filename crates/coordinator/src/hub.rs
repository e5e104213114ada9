//! Coordination hub - routes a request and merges the agents' answers.
//!
//! Every agent whose capability is among the query's intent tags runs
//! concurrently under one request deadline. Agents that are unavailable,
//! fail, or miss the deadline become soft failures and the response is
//! marked degraded; the remaining sections are still returned.

use crate::router::QueryRouter;
use nimbus_common::{
    Agent, AgentOutput, AlertEvent, AlertSubscription, ConsensusReading, IntentTag, Location,
    Observation, Query, SoftFailure,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Overall outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    /// Some dispatched capability failed, timed out, or was unavailable.
    Degraded,
    /// No agent produced a section because it needed more input.
    ClarificationNeeded,
}

/// One agent's labeled narrative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    pub agent_id: String,
    pub agent_name: String,
    pub capability: IntentTag,
    pub narrative: String,
    pub duration_ms: u64,
}

/// Best known conditions for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationConditions {
    Consensus(ConsensusReading),
    Observation(Observation),
}

impl LocationConditions {
    pub fn location(&self) -> &Location {
        match self {
            Self::Consensus(reading) => &reading.location,
            Self::Observation(observation) => &observation.location,
        }
    }

    pub fn temperature(&self) -> f64 {
        match self {
            Self::Consensus(reading) => reading.temperature,
            Self::Observation(observation) => observation.temperature,
        }
    }
}

/// The merged answer to one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub status: ResponseStatus,
    pub query: Query,
    pub sections: Vec<AgentSection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<LocationConditions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alert_events: Vec<AlertEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<AlertSubscription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    /// Questions agents asked back instead of answering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clarifications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub soft_failures: Vec<SoftFailure>,
    pub duration_ms: u64,
}

impl AggregatedResponse {
    pub fn is_degraded(&self) -> bool {
        self.status == ResponseStatus::Degraded
    }

    pub fn section(&self, capability: IntentTag) -> Option<&AgentSection> {
        self.sections.iter().find(|s| s.capability == capability)
    }

    pub fn conditions_for(&self, location: &Location) -> Option<&LocationConditions> {
        self.conditions.iter().find(|c| c.location() == location)
    }

    /// Sections rendered as plain text, one labeled block per agent.
    pub fn combined_text(&self) -> String {
        if self.sections.is_empty() {
            return self.clarifications.join("\n");
        }
        self.sections
            .iter()
            .map(|s| format!("--- {} ---\n{}", s.agent_name, s.narrative))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// What happened to one dispatched agent.
#[derive(Debug)]
enum StepOutcome {
    Completed(AgentOutput),
    Failed(String),
    TimedOut,
    Unavailable,
}

#[derive(Debug)]
struct StepResult {
    agent_id: String,
    agent_name: String,
    outcome: StepOutcome,
    duration_ms: u64,
}

/// Top-level entry point: router plus the registered agents.
pub struct CoordinationHub {
    router: Arc<dyn QueryRouter>,
    agents: Vec<Arc<dyn Agent>>,
    request_timeout: Duration,
}

impl CoordinationHub {
    pub fn new(router: Arc<dyn QueryRouter>, request_timeout: Duration) -> Self {
        Self {
            router,
            agents: Vec::new(),
            request_timeout,
        }
    }

    /// Register an agent. Sections appear in registration order.
    pub fn add_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    pub fn router(&self) -> &Arc<dyn QueryRouter> {
        &self.router
    }

    /// Handle a request from an anonymous caller.
    pub async fn handle(&self, raw_text: &str) -> AggregatedResponse {
        let query = self.router.classify(raw_text).await;
        self.dispatch(query).await
    }

    /// Handle a request on behalf of `owner`.
    pub async fn handle_as(&self, owner: &str, raw_text: &str) -> AggregatedResponse {
        let mut query = self.router.classify(raw_text).await;
        query.owner = Some(owner.to_string());
        self.dispatch(query).await
    }

    /// Run the matching agents for an already classified query.
    pub async fn dispatch(&self, query: Query) -> AggregatedResponse {
        let start_time = Instant::now();
        let deadline = start_time + self.request_timeout;

        info!(
            router = %self.router.name(),
            tags = ?query.intent_tags,
            locations = query.extracted_locations.len(),
            "Dispatching request"
        );

        let mut soft_failures = Vec::new();
        for tag in &query.intent_tags {
            if !self.agents.iter().any(|a| a.capability() == *tag) {
                warn!(tag = %tag, "No agent registered for capability");
                soft_failures.push(
                    SoftFailure::new("hub", "no agent registered for this capability")
                        .for_target(tag.as_str()),
                );
            }
        }

        let shared = Arc::new(query.clone());
        let mut handles = Vec::new();

        for agent in self.agents.iter().filter(|a| query.has_tag(a.capability())) {
            let agent = agent.clone();
            let query = shared.clone();

            let handle = tokio::spawn(async move {
                let step_start = Instant::now();
                let agent_id = agent.id().to_string();
                let agent_name = agent.name().to_string();

                let outcome = if !agent.is_available() {
                    StepOutcome::Unavailable
                } else {
                    match tokio::time::timeout_at(deadline, agent.handle(&query)).await {
                        Ok(Ok(output)) => StepOutcome::Completed(output),
                        Ok(Err(e)) => StepOutcome::Failed(e.to_string()),
                        Err(_) => StepOutcome::TimedOut,
                    }
                };

                StepResult {
                    agent_id,
                    agent_name,
                    outcome,
                    duration_ms: step_start.elapsed().as_millis() as u64,
                }
            });

            handles.push(handle);
        }

        let mut step_results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => step_results.push(result),
                Err(e) => {
                    error!(error = %e, "Agent task join error");
                    soft_failures.push(SoftFailure::new("hub", format!("agent task join error: {e}")));
                }
            }
        }

        let response = merge(query, step_results, soft_failures, start_time.elapsed());
        info!(
            status = ?response.status,
            sections = response.sections.len(),
            soft_failures = response.soft_failures.len(),
            duration_ms = response.duration_ms,
            "Request completed"
        );
        response
    }
}

/// Rank of a conditions entry; higher replaces lower for the same location.
fn conditions_rank(conditions: &LocationConditions, from_intelligence: bool) -> u8 {
    match conditions {
        LocationConditions::Observation(_) => 0,
        LocationConditions::Consensus(_) if from_intelligence => 2,
        LocationConditions::Consensus(_) => 1,
    }
}

fn upsert_conditions(
    merged: &mut Vec<(LocationConditions, u8)>,
    conditions: LocationConditions,
    rank: u8,
) {
    match merged.iter_mut().find(|(c, _)| c.location() == conditions.location()) {
        Some(existing) if existing.1 < rank => *existing = (conditions, rank),
        Some(_) => {}
        None => merged.push((conditions, rank)),
    }
}

fn merge(
    query: Query,
    step_results: Vec<StepResult>,
    mut soft_failures: Vec<SoftFailure>,
    elapsed: Duration,
) -> AggregatedResponse {
    let mut sections = Vec::new();
    let mut merged_conditions: Vec<(LocationConditions, u8)> = Vec::new();
    let mut alert_events = Vec::new();
    let mut subscriptions = Vec::new();
    let mut recommendations: Vec<String> = Vec::new();
    let mut clarifications = Vec::new();
    let mut agent_failed = false;

    for step in step_results {
        let component = format!("agent:{}", step.agent_id);
        let output = match step.outcome {
            StepOutcome::Completed(output) => output,
            StepOutcome::Failed(reason) => {
                warn!(agent = %step.agent_id, reason = %reason, "Agent failed");
                soft_failures.push(SoftFailure::new(component, reason));
                agent_failed = true;
                continue;
            }
            StepOutcome::TimedOut => {
                warn!(agent = %step.agent_id, duration_ms = step.duration_ms, "Agent timed out");
                soft_failures.push(SoftFailure::new(component, "timed out"));
                agent_failed = true;
                continue;
            }
            StepOutcome::Unavailable => {
                warn!(agent = %step.agent_id, "Agent not available");
                soft_failures.push(SoftFailure::new(component, "not available"));
                agent_failed = true;
                continue;
            }
        };

        debug!(
            agent = %step.agent_id,
            duration_ms = step.duration_ms,
            clarification = output.needs_clarification,
            "Agent completed"
        );
        soft_failures.extend(output.soft_failures);

        if output.needs_clarification {
            clarifications.push(output.narrative);
            continue;
        }

        let from_intelligence = output.capability == IntentTag::Intelligence;
        for reading in output.readings {
            let conditions = LocationConditions::Consensus(reading);
            let rank = conditions_rank(&conditions, from_intelligence);
            upsert_conditions(&mut merged_conditions, conditions, rank);
        }
        for observation in output.observations {
            upsert_conditions(&mut merged_conditions, LocationConditions::Observation(observation), 0);
        }

        alert_events.extend(output.alert_events);
        subscriptions.extend(output.subscription);
        for line in output.recommendations {
            if !recommendations.contains(&line) {
                recommendations.push(line);
            }
        }

        sections.push(AgentSection {
            agent_id: step.agent_id,
            agent_name: step.agent_name,
            capability: output.capability,
            narrative: output.narrative,
            duration_ms: step.duration_ms,
        });
    }

    let status = if sections.is_empty() && !clarifications.is_empty() {
        ResponseStatus::ClarificationNeeded
    } else if agent_failed || !soft_failures.is_empty() {
        ResponseStatus::Degraded
    } else {
        ResponseStatus::Ok
    };

    AggregatedResponse {
        status,
        query,
        sections,
        conditions: merged_conditions.into_iter().map(|(c, _)| c).collect(),
        alert_events,
        subscriptions,
        recommendations,
        clarifications,
        soft_failures,
        duration_ms: elapsed.as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::KeywordRouter;
    use async_trait::async_trait;
    use chrono::Utc;
    use nimbus_common::{NimbusError, ReadingStatus, Result};

    /// Agent with a fixed output.
    struct FixedAgent {
        id: String,
        capability: IntentTag,
        output: AgentOutput,
    }

    impl FixedAgent {
        fn new(id: &str, capability: IntentTag, output: AgentOutput) -> Self {
            Self {
                id: id.to_string(),
                capability,
                output,
            }
        }
    }

    #[async_trait]
    impl Agent for FixedAgent {
        fn id(&self) -> &str {
            &self.id
        }

        fn name(&self) -> &str {
            &self.id
        }

        fn capability(&self) -> IntentTag {
            self.capability
        }

        async fn handle(&self, _query: &Query) -> Result<AgentOutput> {
            Ok(self.output.clone())
        }
    }

    struct BrokenAgent;

    #[async_trait]
    impl Agent for BrokenAgent {
        fn id(&self) -> &str {
            "broken"
        }

        fn name(&self) -> &str {
            "Broken"
        }

        fn capability(&self) -> IntentTag {
            IntentTag::Weather
        }

        async fn handle(&self, _query: &Query) -> Result<AgentOutput> {
            Err(NimbusError::Agent("boom".into()))
        }
    }

    fn reading(location: &str, temperature: f64) -> ConsensusReading {
        let mut r = ConsensusReading::unknown(Location::named(location), Utc::now());
        r.temperature = temperature;
        r.confidence_score = 0.8;
        r.status = ReadingStatus::Consensus;
        r.contributing_sources = ["nws".to_string(), "wttr".to_string()].into();
        r
    }

    fn hub() -> CoordinationHub {
        CoordinationHub::new(Arc::new(KeywordRouter::new()), Duration::from_secs(2))
    }

    fn tagged(text: &str, tags: &[IntentTag]) -> Query {
        let mut query = Query::new(text);
        query.intent_tags = tags.iter().copied().collect();
        query
    }

    #[tokio::test]
    async fn test_consensus_preferred_over_observation() {
        let mut weather = AgentOutput::new("weather", IntentTag::Weather, "Chicago 70");
        weather.observations.push(Observation::new("nws", Location::named("Chicago"), 70.0));
        let mut intelligence = AgentOutput::new("intelligence", IntentTag::Intelligence, "Chicago 71");
        intelligence.readings.push(reading("Chicago", 71.0));

        let response = hub()
            .add_agent(Arc::new(FixedAgent::new("weather", IntentTag::Weather, weather)))
            .add_agent(Arc::new(FixedAgent::new("intelligence", IntentTag::Intelligence, intelligence)))
            .dispatch(tagged("x", &[IntentTag::Weather, IntentTag::Intelligence]))
            .await;

        assert_eq!(response.status, ResponseStatus::Ok);
        assert_eq!(response.conditions.len(), 1);
        assert!(matches!(
            response.conditions_for(&Location::named("Chicago")),
            Some(LocationConditions::Consensus(r)) if r.temperature == 71.0
        ));
        assert_eq!(
            response.combined_text(),
            "--- weather ---\nChicago 70\n\n--- intelligence ---\nChicago 71"
        );
    }

    #[tokio::test]
    async fn test_only_tagged_agents_run() {
        let response = hub()
            .add_agent(Arc::new(FixedAgent::new(
                "weather",
                IntentTag::Weather,
                AgentOutput::new("weather", IntentTag::Weather, "sunny"),
            )))
            .add_agent(Arc::new(BrokenAgent))
            .dispatch(tagged("x", &[IntentTag::Alerts]))
            .await;

        assert!(response.sections.is_empty());
        assert!(response.is_degraded());
        assert_eq!(response.soft_failures[0].component, "hub");
        assert_eq!(response.soft_failures[0].target.as_deref(), Some("alerts"));
    }

    #[tokio::test]
    async fn test_failed_agent_degrades_but_keeps_others() {
        let response = hub()
            .add_agent(Arc::new(FixedAgent::new(
                "weather",
                IntentTag::Weather,
                AgentOutput::new("weather", IntentTag::Weather, "sunny"),
            )))
            .add_agent(Arc::new(BrokenAgent))
            .dispatch(tagged("x", &[IntentTag::Weather]))
            .await;

        assert!(response.is_degraded());
        assert_eq!(response.sections.len(), 1);
        assert!(response.soft_failures.iter().any(|f| f.component == "agent:broken"));
    }

    #[tokio::test]
    async fn test_clarification_only() {
        let response = hub()
            .add_agent(Arc::new(FixedAgent::new(
                "weather",
                IntentTag::Weather,
                AgentOutput::clarification("weather", IntentTag::Weather, "Which location?"),
            )))
            .dispatch(tagged("x", &[IntentTag::Weather]))
            .await;

        assert_eq!(response.status, ResponseStatus::ClarificationNeeded);
        assert_eq!(response.combined_text(), "Which location?");
    }

    #[tokio::test]
    async fn test_owner_stamped() {
        struct OwnerEcho;

        #[async_trait]
        impl Agent for OwnerEcho {
            fn id(&self) -> &str {
                "echo"
            }
            fn name(&self) -> &str {
                "Echo"
            }
            fn capability(&self) -> IntentTag {
                IntentTag::Weather
            }
            async fn handle(&self, query: &Query) -> Result<AgentOutput> {
                Ok(AgentOutput::new(
                    "echo",
                    IntentTag::Weather,
                    query.owner.clone().unwrap_or_default(),
                ))
            }
        }

        let response = hub()
            .add_agent(Arc::new(OwnerEcho))
            .handle_as("dana", "weather in Paris")
            .await;
        assert_eq!(response.sections[0].narrative, "dana");
        assert_eq!(response.query.owner.as_deref(), Some("dana"));
    }
}
