//! Core agent traits and configuration.
//!
//! These live in `nimbus-common` so the agents crate and the coordinator can
//! both reference them without circular dependencies.

use crate::output::AgentOutput;
use crate::query::{IntentTag, Query};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The trait every specialized agent implements.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Get the agent's unique identifier.
    fn id(&self) -> &str;

    /// Get the agent's human-readable name.
    fn name(&self) -> &str;

    /// The capability tag this agent serves.
    fn capability(&self) -> IntentTag;

    /// Handle a classified query.
    async fn handle(&self, query: &Query) -> Result<AgentOutput>;

    /// Whether the agent's dependencies are in place. Unavailable agents are
    /// skipped by the hub and the response is marked degraded.
    fn is_available(&self) -> bool {
        true
    }
}

/// Configuration for agent creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent ID
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Overrides the agent's built-in prompt when it asks a model for prose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}
