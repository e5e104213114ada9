//! Classified query types shared by routers and agents.

use crate::error::{NimbusError, Result};
use crate::observation::{ConsensusReading, Location};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Capability tag an incoming query is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    Weather,
    Intelligence,
    Alerts,
    Travel,
}

impl IntentTag {
    pub const ALL: [IntentTag; 4] = [
        IntentTag::Weather,
        IntentTag::Intelligence,
        IntentTag::Alerts,
        IntentTag::Travel,
    ];

    /// Tag applied when nothing in the query matches.
    pub const FALLBACK: IntentTag = IntentTag::Weather;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::Intelligence => "intelligence",
            Self::Alerts => "alerts",
            Self::Travel => "travel",
        }
    }
}

impl fmt::Display for IntentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentTag {
    type Err = NimbusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "weather" => Ok(Self::Weather),
            "intelligence" | "consensus" => Ok(Self::Intelligence),
            "alerts" | "alert" => Ok(Self::Alerts),
            "travel" => Ok(Self::Travel),
            other => Err(NimbusError::ClassificationAmbiguous(format!(
                "unknown intent tag '{other}'"
            ))),
        }
    }
}

/// Which side of a threshold triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSide {
    High,
    Low,
}

/// The fixed set of metrics a threshold can be keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TemperatureHigh,
    TemperatureLow,
    WindSpeed,
    HumidityHigh,
    HumidityLow,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::TemperatureHigh,
        Metric::TemperatureLow,
        Metric::WindSpeed,
        Metric::HumidityHigh,
        Metric::HumidityLow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TemperatureHigh => "temperature_high",
            Self::TemperatureLow => "temperature_low",
            Self::WindSpeed => "wind_speed",
            Self::HumidityHigh => "humidity_high",
            Self::HumidityLow => "humidity_low",
        }
    }

    pub fn side(self) -> ThresholdSide {
        match self {
            Self::TemperatureHigh | Self::WindSpeed | Self::HumidityHigh => ThresholdSide::High,
            Self::TemperatureLow | Self::HumidityLow => ThresholdSide::Low,
        }
    }

    /// The reading value this metric is compared against.
    pub fn value_of(self, reading: &ConsensusReading) -> f64 {
        match self {
            Self::TemperatureHigh | Self::TemperatureLow => reading.temperature,
            Self::WindSpeed => reading.wind_speed,
            Self::HumidityHigh | Self::HumidityLow => reading.humidity,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::TemperatureHigh | Self::TemperatureLow => "°F",
            Self::WindSpeed => " mph",
            Self::HumidityHigh | Self::HumidityLow => "%",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = NimbusError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase();
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| {
                NimbusError::ThresholdConfigInvalid(format!(
                    "unknown metric '{s}' (expected one of: {})",
                    Metric::ALL.map(Metric::as_str).join(", ")
                ))
            })
    }
}

/// Activity context used for personalized recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Outdoor,
    Hiking,
    Travel,
    Commute,
    Events,
}

/// A classified natural-language request. Read-only downstream of the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub raw_text: String,
    pub extracted_locations: Vec<Location>,
    pub extracted_thresholds: BTreeMap<Metric, f64>,
    pub intent_tags: BTreeSet<IntentTag>,
    #[serde(default)]
    pub activities: BTreeSet<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_days: Option<u32>,
    /// True when no trigger matched and the fallback tag was applied.
    #[serde(default)]
    pub ambiguous: bool,
    /// Who asked. Set by the hub, not the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Query {
    /// A query with only the raw text filled in.
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            extracted_locations: Vec::new(),
            extracted_thresholds: BTreeMap::new(),
            intent_tags: BTreeSet::new(),
            activities: BTreeSet::new(),
            trip_days: None,
            ambiguous: false,
            owner: None,
        }
    }

    pub fn has_tag(&self, tag: IntentTag) -> bool {
        self.intent_tags.contains(&tag)
    }

    /// Apply the fallback tag if classification produced nothing.
    pub fn ensure_fallback(&mut self) {
        if self.intent_tags.is_empty() {
            self.intent_tags.insert(IntentTag::FALLBACK);
            self.ambiguous = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_keys_parse() {
        assert_eq!("temperature_high".parse::<Metric>().unwrap(), Metric::TemperatureHigh);
        assert_eq!(" Wind_Speed ".parse::<Metric>().unwrap(), Metric::WindSpeed);
        let err = "dew_point".parse::<Metric>().unwrap_err();
        assert!(matches!(err, NimbusError::ThresholdConfigInvalid(_)));
    }

    #[test]
    fn metric_sides() {
        assert_eq!(Metric::TemperatureHigh.side(), ThresholdSide::High);
        assert_eq!(Metric::WindSpeed.side(), ThresholdSide::High);
        assert_eq!(Metric::HumidityLow.side(), ThresholdSide::Low);
    }

    #[test]
    fn fallback_marks_query_ambiguous() {
        let mut query = Query::new("hello");
        query.ensure_fallback();
        assert!(query.has_tag(IntentTag::Weather));
        assert!(query.ambiguous);

        let mut tagged = Query::new("trip");
        tagged.intent_tags.insert(IntentTag::Travel);
        tagged.ensure_fallback();
        assert!(!tagged.ambiguous);
        assert_eq!(tagged.intent_tags.len(), 1);
    }

    #[test]
    fn metric_serializes_as_snake_case_key() {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(Metric::TemperatureHigh, 85.0);
        let json = serde_json::to_string(&thresholds).unwrap();
        assert_eq!(json, r#"{"temperature_high":85.0}"#);
    }
}
