//! Specialist agents for Nimbus.
//!
//! - **Weather Agent**: current conditions from the primary source
//! - **Intelligence Agent**: multi-source consensus with a reliability report
//! - **Alert Agent**: sets up subscriptions and runs on-demand checks
//! - **Travel Agent**: per-destination conditions and packing advice
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AGENTS                                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────┐  ┌────────────┐  ┌─────────┐  ┌─────────┐     │
//! │  │ Weather │  │Intelligence│  │  Alert  │  │ Travel  │     │
//! │  └────┬────┘  └─────┬──────┘  └────┬────┘  └────┬────┘     │
//! │       │             │   conditions │            │          │
//! │       │             ◄──────────────┘            │          │
//! │       ▼             ▼                           ▼          │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │        SourceSet + ConsensusFuser (nimbus-fusion)   │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each agent implements [`nimbus_common::Agent`] and serves one
//! [`IntentTag`](nimbus_common::IntentTag).

pub mod alert;
pub mod intelligence;
pub mod travel;
pub mod weather;

pub use alert::AlertAgent;
pub use intelligence::IntelligenceAgent;
pub use travel::TravelAgent;
pub use weather::WeatherAgent;
