//! Coordination layer for Nimbus.
//!
//! The coordinator is the entry point that:
//! 1. Receives natural-language weather requests
//! 2. Classifies them with a keyword or model-backed router
//! 3. Dispatches to the matching agents concurrently
//! 4. Merges their answers into one response
//!
//! # Architecture
//!
//! ```text
//! User Request
//!      │
//!      ▼
//! ┌─────────────────┐
//! │ CoordinationHub │  ◄── QueryRouter (keyword | model)
//! │   (this crate)  │
//! └────────┬────────┘
//!          │ concurrent dispatch, one deadline
//!    ┌─────┴──────┬──────────────┬──────────┐
//!    ▼            ▼              ▼          ▼
//! [Weather] [Intelligence]   [Alert]    [Travel]
//!              │    ▲            │
//!              ▼    └────────────┘
//!         ConsensusFuser   AlertEvaluator ── SubscriptionStore
//! ```

pub mod config;
pub mod demo;
pub mod hub;
pub mod router;
pub mod system;

pub use config::{CoordinatorConfig, HubConfig, RouterConfig, RouterKind, SourcesConfig};
pub use demo::demo_sources;
pub use hub::{AgentSection, AggregatedResponse, CoordinationHub, LocationConditions, ResponseStatus};
pub use router::{KeywordRouter, LlmRouter, QueryRouter, build_router};
pub use system::Nimbus;
