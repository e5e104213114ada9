//! Multi-source weather consensus.
//!
//! # Architecture
//!
//! ```text
//!  [source A]   [source B]   [source C]      ObservationSource adapters
//!       │            │            │
//!       └──── SourceSet::gather (concurrent, per-source timeout) ────┐
//!                                                                    │ Observations
//!                                                                    ▼
//!                                                          ConsensusFuser::fuse
//!                                                          (pure, synchronous)
//!                                                                    │
//!                                                                    ▼
//!                                                          ConsensusReading + confidence
//! ```
//!
//! The fuser performs no I/O so its scoring can be tested without a network.

pub mod config;
pub mod fuser;
pub mod gather;
pub mod static_source;

pub use config::FusionConfig;
pub use fuser::ConsensusFuser;
pub use gather::{GatherOutcome, SourceSet};
pub use static_source::StaticSource;
