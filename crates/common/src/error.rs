//! Error types for Nimbus.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NimbusError {
    /// One observation provider failed. Fusion continues with the others.
    #[error("Source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// Zero sources produced an observation for a fusion call.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// The router found no confident intent. Resolved by the fallback tag
    /// inside the router; never returned from `classify`.
    #[error("Classification ambiguous: {0}")]
    ClassificationAmbiguous(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// A threshold key outside the enumerated metric set.
    #[error("Invalid threshold configuration: {0}")]
    ThresholdConfigInvalid(String),

    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("Version conflict on subscription {id}: expected {expected}, found {found}")]
    VersionConflict { id: String, expected: u64, found: u64 },

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NimbusError {
    pub fn source_unavailable(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error degrades a result instead of invalidating a request.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::InsufficientData(_)
                | Self::Timeout(_)
                | Self::Llm(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NimbusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_unavailable_message_names_source() {
        let err = NimbusError::source_unavailable("wttr", "HTTP 503");
        assert_eq!(err.to_string(), "Source 'wttr' unavailable: HTTP 503");
        assert!(err.is_soft());
    }

    #[test]
    fn config_errors_are_not_soft() {
        assert!(!NimbusError::ThresholdConfigInvalid("dew_point".into()).is_soft());
        assert!(!NimbusError::SubscriptionNotFound("sub_1".into()).is_soft());
    }
}
