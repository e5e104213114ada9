//! Tunable constants for the confidence curve.

use nimbus_common::{NimbusError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Constants for [`ConsensusFuser`](crate::ConsensusFuser).
///
/// Multi-source confidence before the categorical factor is
///
/// ```text
/// numeric = clamp(anchor + source_bonus · ln(count) − spread_penalty · spread, 0, 1)
/// anchor  = max(base_confidence, best per-source confidence)
/// ```
///
/// and when `spread > max_reasonable_spread` it is further capped at
/// `low_confidence_threshold · max_reasonable_spread / spread`.
/// The result is multiplied by `1 − condition_penalty · (1 − agreement)`
/// and floored at `min_confidence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Confidence of a lone observation without `raw_confidence`.
    pub baseline_confidence: f64,

    /// Starting point for two or more agreeing sources.
    pub base_confidence: f64,

    /// `k`: confidence lost per unit of spread (°F or mph).
    pub spread_penalty: f64,

    /// `m`: confidence gained per natural-log unit of source count.
    pub source_bonus: f64,

    /// Disagreement beyond which a reading is always low-confidence.
    pub max_reasonable_spread: f64,

    pub low_confidence_threshold: f64,

    /// Weight of categorical disagreement, 0 disables it.
    pub condition_penalty: f64,

    /// Floor for any reading with at least one source. Zero is reserved for
    /// readings with no sources.
    pub min_confidence: f64,

    /// Default per-source weights, keyed by `source_id`.
    pub source_reliability: HashMap<String, f64>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            baseline_confidence: 0.5,
            base_confidence: 0.7,
            spread_penalty: 0.03,
            source_bonus: 0.1,
            max_reasonable_spread: 15.0,
            low_confidence_threshold: 0.5,
            condition_penalty: 0.4,
            min_confidence: 0.01,
            source_reliability: HashMap::from([
                ("nws".to_string(), 0.9),
                ("wttr".to_string(), 0.8),
                ("mcp".to_string(), 0.85),
            ]),
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(NimbusError::Config(format!(
                    "fusion.{name} must be within [0, 1], got {v}"
                )))
            }
        };
        unit("baseline_confidence", self.baseline_confidence)?;
        unit("base_confidence", self.base_confidence)?;
        unit("low_confidence_threshold", self.low_confidence_threshold)?;
        unit("condition_penalty", self.condition_penalty)?;
        unit("min_confidence", self.min_confidence)?;

        if !(self.spread_penalty >= 0.0 && self.source_bonus >= 0.0) {
            return Err(NimbusError::Config(
                "fusion.spread_penalty and fusion.source_bonus must be non-negative".into(),
            ));
        }
        if !(self.max_reasonable_spread > 0.0) {
            return Err(NimbusError::Config(
                "fusion.max_reasonable_spread must be positive".into(),
            ));
        }
        if self.min_confidence <= 0.0 || self.min_confidence >= self.low_confidence_threshold {
            return Err(NimbusError::Config(format!(
                "fusion.min_confidence must be in (0, low_confidence_threshold), got {}",
                self.min_confidence
            )));
        }
        if let Some((source, weight)) = self
            .source_reliability
            .iter()
            .find(|(_, w)| !(w.is_finite() && **w > 0.0))
        {
            return Err(NimbusError::Config(format!(
                "fusion.source_reliability.{source} must be a positive number, got {weight}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        FusionConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: FusionConfig = toml::from_str(
            r#"
max_reasonable_spread = 10.0

[source_reliability]
nws = 1.0
"#,
        )
        .unwrap();
        assert_eq!(config.max_reasonable_spread, 10.0);
        assert_eq!(config.base_confidence, 0.7);
        assert_eq!(config.source_reliability.get("nws"), Some(&1.0));
        assert!(config.source_reliability.get("wttr").is_none());
        config.validate().unwrap();
    }

    #[test]
    fn floor_must_stay_below_low_threshold() {
        let config = FusionConfig {
            min_confidence: 0.6,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_reliability_rejected() {
        let mut config = FusionConfig::default();
        config.source_reliability.insert("bad".into(), 0.0);
        assert!(config.validate().is_err());
    }
}
