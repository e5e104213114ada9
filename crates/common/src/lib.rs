//! Common types and traits shared across Nimbus crates.
//!
//! This crate holds the canonical data model (observations, consensus
//! readings, queries, subscriptions, alert events), the error taxonomy, and
//! the agent and observation-source contracts every other crate builds on.

pub mod error;
pub mod observation;
pub mod output;
pub mod query;
pub mod source;
pub mod subscription;
pub mod traits;

pub use error::{NimbusError, Result};
pub use observation::{ConditionCode, ConsensusReading, Location, MetricSpreads, Observation, ReadingStatus};
pub use output::{AgentOutput, SoftFailure};
pub use query::{Activity, IntentTag, Metric, Query, ThresholdSide};
pub use source::ObservationSource;
pub use subscription::{
    AlertEvent, AlertMetric, AlertSeverity, AlertSubscription, AlertType, Direction,
    NewSubscription, ObservedValue,
};
pub use traits::{Agent, AgentConfig};
