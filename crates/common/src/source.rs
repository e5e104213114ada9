//! Observation source adapter contract.

use crate::error::Result;
use crate::observation::{Location, Observation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One external weather provider, normalized to the canonical [`Observation`].
///
/// Adapters own all knowledge of their provider's response shape. A failed
/// fetch returns `NimbusError::SourceUnavailable`.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    fn source_id(&self) -> &str;

    async fn fetch(&self, location: &Location, as_of: Option<DateTime<Utc>>) -> Result<Observation>;
}
