//! Standing alert subscriptions for Nimbus.
//!
//! - [`SubscriptionStore`]: CRUD over subscriptions with per-key write locks
//! - [`AlertEvaluator`]: compares current conditions against thresholds and
//!   emits [`AlertEvent`](nimbus_common::AlertEvent)s, with a cool-down so a
//!   persisting crossing is not repeated every tick
//! - [`NotificationSink`]: where events go once emitted
//! - [`AlertMonitor`]: runs the evaluator on an interval in the background

pub mod config;
pub mod evaluator;
pub mod monitor;
pub mod recommendations;
pub mod sink;
pub mod store;

pub use config::AlertsConfig;
pub use evaluator::{AlertEvaluator, ConditionsProvider, EvaluationOutcome, EvaluationState};
pub use monitor::{AlertMonitor, MonitorHandle, MonitorStats};
pub use recommendations::activity_recommendations;
pub use sink::{ChannelSink, LogSink, MemorySink, NotificationSink};
pub use store::{InMemorySubscriptionStore, SubscriptionStore};
