//! What agents hand back to the coordination hub.

use crate::observation::{ConsensusReading, Observation};
use crate::query::IntentTag;
use crate::subscription::{AlertEvent, AlertSubscription};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recoverable failure that degrades a result instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftFailure {
    /// Which component reported it ("source:wttr", "agent:travel", "sink").
    pub component: String,
    /// What it was working on, usually a location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub reason: String,
}

impl SoftFailure {
    pub fn new(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            target: None,
            reason: reason.into(),
        }
    }

    pub fn for_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Output of one agent for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent_id: String,
    pub capability: IntentTag,

    /// Human-readable section for the merged response.
    pub narrative: String,

    /// Single-source observations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<Observation>,

    /// Fused multi-source readings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readings: Vec<ConsensusReading>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alert_events: Vec<AlertEvent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<AlertSubscription>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub soft_failures: Vec<SoftFailure>,

    /// The agent could not act without more input (usually a location).
    #[serde(default)]
    pub needs_clarification: bool,

    pub timestamp: DateTime<Utc>,
}

impl AgentOutput {
    pub fn new(agent_id: impl Into<String>, capability: IntentTag, narrative: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            capability,
            narrative: narrative.into(),
            observations: Vec::new(),
            readings: Vec::new(),
            alert_events: Vec::new(),
            subscription: None,
            recommendations: Vec::new(),
            soft_failures: Vec::new(),
            needs_clarification: false,
            timestamp: Utc::now(),
        }
    }

    /// An output asking the user for the missing piece.
    pub fn clarification(
        agent_id: impl Into<String>,
        capability: IntentTag,
        question: impl Into<String>,
    ) -> Self {
        let mut output = Self::new(agent_id, capability, question);
        output.needs_clarification = true;
        output
    }
}
