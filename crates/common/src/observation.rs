//! Observation and consensus types.
//!
//! Canonical units: temperature in °F, wind speed in mph, humidity in percent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A normalized place identifier: a resolved place name or a coordinate pair.
///
/// Names are stored title-cased with collapsed whitespace so that
/// "new  york" and "New York" compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn named(name: &str) -> Self {
        let normalized = name
            .split_whitespace()
            .map(title_case_word)
            .collect::<Vec<_>>()
            .join(" ");
        Self(normalized)
    }

    pub fn coordinates(latitude: f64, longitude: f64) -> Self {
        Self(format!("{latitude:.4},{longitude:.4}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

/// Categorical weather condition.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConditionCode {
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    FreezingRain,
    Hail,
    Thunderstorm,
    Blizzard,
    Tornado,
    Hurricane,
    #[default]
    Unknown,
}

impl ConditionCode {
    /// Map a free-text provider description ("Light Rain Showers",
    /// "Partly Cloudy", "Thunderstorm in vicinity") to a condition code.
    ///
    /// Most specific phrases are checked first.
    pub fn from_description(description: &str) -> Self {
        let lower = description.to_lowercase();
        let has = |needle: &str| lower.contains(needle);

        if has("hurricane") || has("tropical storm") {
            Self::Hurricane
        } else if has("tornado") || has("funnel") {
            Self::Tornado
        } else if has("blizzard")
            || has("snowstorm")
            || has("snow storm")
            || has("winter storm")
        {
            Self::Blizzard
        } else if has("ice storm") {
            Self::FreezingRain
        } else if has("thunder") || has("storm") {
            Self::Thunderstorm
        } else if has("hail") {
            Self::Hail
        } else if has("freezing rain") || has("freezing drizzle") || has("ice") {
            Self::FreezingRain
        } else if has("sleet") {
            Self::Sleet
        } else if has("snow") || has("flurr") {
            Self::Snow
        } else if has("heavy rain") || has("torrential") || has("downpour") {
            Self::HeavyRain
        } else if has("drizzle") {
            Self::Drizzle
        } else if has("rain") || has("shower") {
            Self::Rain
        } else if has("fog") || has("mist") || has("haze") {
            Self::Fog
        } else if has("partly") || has("mostly sunny") || has("scattered clouds") {
            Self::PartlyCloudy
        } else if has("cloud") || has("overcast") {
            Self::Cloudy
        } else if has("clear") || has("sunny") || has("fair") {
            Self::Clear
        } else {
            Self::Unknown
        }
    }

    /// Conditions that trigger `severe_weather` alerts.
    pub fn is_severe(self) -> bool {
        matches!(
            self,
            Self::Thunderstorm
                | Self::Hail
                | Self::FreezingRain
                | Self::Blizzard
                | Self::Tornado
                | Self::Hurricane
        )
    }

    /// Conditions that trigger `travel_disruption` alerts.
    pub fn disrupts_travel(self) -> bool {
        matches!(
            self,
            Self::Fog
                | Self::HeavyRain
                | Self::Snow
                | Self::Sleet
                | Self::FreezingRain
                | Self::Blizzard
        )
    }

    pub fn is_wet(self) -> bool {
        matches!(
            self,
            Self::Drizzle | Self::Rain | Self::HeavyRain | Self::Thunderstorm | Self::Hail
        )
    }

    pub fn is_wintry(self) -> bool {
        matches!(
            self,
            Self::Snow | Self::Sleet | Self::FreezingRain | Self::Blizzard
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::FreezingRain => "Freezing Rain",
            Self::Hail => "Hail",
            Self::Thunderstorm => "Thunderstorm",
            Self::Blizzard => "Blizzard",
            Self::Tornado => "Tornado",
            Self::Hurricane => "Hurricane",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single source's report for one location and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub source_id: String,
    pub location: Location,
    pub timestamp: DateTime<Utc>,
    /// °F
    pub temperature: f64,
    pub condition_code: ConditionCode,
    /// mph
    pub wind_speed: f64,
    /// percent, 0-100
    pub humidity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_confidence: Option<f64>,
}

impl Observation {
    pub fn new(source_id: impl Into<String>, location: Location, temperature: f64) -> Self {
        Self {
            source_id: source_id.into(),
            location,
            timestamp: Utc::now(),
            temperature,
            condition_code: ConditionCode::Unknown,
            wind_speed: 0.0,
            humidity: 50.0,
            raw_confidence: None,
        }
    }

    pub fn with_condition(mut self, condition: ConditionCode) -> Self {
        self.condition_code = condition;
        self
    }

    pub fn with_wind_speed(mut self, mph: f64) -> Self {
        self.wind_speed = mph;
        self
    }

    pub fn with_humidity(mut self, percent: f64) -> Self {
        self.humidity = percent.clamp(0.0, 100.0);
        self
    }

    /// Non-finite values are treated as "no confidence reported".
    pub fn with_raw_confidence(mut self, confidence: f64) -> Self {
        self.raw_confidence = confidence.is_finite().then(|| confidence.clamp(0.0, 1.0));
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// How a consensus reading was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    Consensus,
    SingleSource,
    /// Zero sources succeeded; values are placeholders.
    Unknown,
}

/// Maximum pairwise disagreement per continuous metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSpreads {
    pub temperature: f64,
    pub wind_speed: f64,
    pub humidity: f64,
}

/// Fused result across observations with a confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReading {
    pub location: Location,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub condition: ConditionCode,
    pub wind_speed: f64,
    pub humidity: f64,
    pub confidence_score: f64,
    pub contributing_sources: BTreeSet<String>,
    /// Headline disagreement: the larger of the temperature and wind spreads.
    pub spread: f64,
    pub spreads: MetricSpreads,
    pub status: ReadingStatus,
}

impl ConsensusReading {
    /// The deterministic stand-in used when no source responded.
    pub fn unknown(location: Location, at: DateTime<Utc>) -> Self {
        Self {
            location,
            timestamp: at,
            temperature: 0.0,
            condition: ConditionCode::Unknown,
            wind_speed: 0.0,
            humidity: 0.0,
            confidence_score: 0.0,
            contributing_sources: BTreeSet::new(),
            spread: 0.0,
            spreads: MetricSpreads::default(),
            status: ReadingStatus::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.status == ReadingStatus::Unknown
    }

    pub fn source_count(&self) -> usize {
        self.contributing_sources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_names_normalize() {
        assert_eq!(Location::named("new  york"), Location::named("New York"));
        assert_eq!(Location::named("SAN FRANCISCO").as_str(), "San Francisco");
        assert_eq!(Location::coordinates(51.5074, -0.1278).as_str(), "51.5074,-0.1278");
    }

    #[test]
    fn condition_descriptions_map_to_codes() {
        assert_eq!(ConditionCode::from_description("Light Rain Showers"), ConditionCode::Rain);
        assert_eq!(ConditionCode::from_description("Partly Cloudy"), ConditionCode::PartlyCloudy);
        assert_eq!(
            ConditionCode::from_description("Thunderstorms in the vicinity"),
            ConditionCode::Thunderstorm
        );
        assert_eq!(ConditionCode::from_description("Patchy fog"), ConditionCode::Fog);
        assert_eq!(ConditionCode::from_description("Sunny"), ConditionCode::Clear);
        assert_eq!(ConditionCode::from_description("???"), ConditionCode::Unknown);
    }

    #[test]
    fn severe_and_travel_sets() {
        assert!(ConditionCode::Tornado.is_severe());
        assert!(!ConditionCode::Rain.is_severe());
        assert!(ConditionCode::Fog.disrupts_travel());
        assert!(!ConditionCode::Clear.disrupts_travel());
    }

    #[test]
    fn observation_builder_clamps() {
        let obs = Observation::new("nws", Location::named("Boston"), 71.0)
            .with_humidity(140.0)
            .with_raw_confidence(1.7);
        assert_eq!(obs.humidity, 100.0);
        assert_eq!(obs.raw_confidence, Some(1.0));
    }

    #[test]
    fn non_finite_raw_confidence_is_dropped() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let obs = Observation::new("nws", Location::named("Boston"), 71.0)
                .with_raw_confidence(bad);
            assert_eq!(obs.raw_confidence, None, "{bad}");
        }
    }

    #[test]
    fn winter_storms_are_not_thunderstorms() {
        assert_eq!(ConditionCode::from_description("Snowstorm"), ConditionCode::Blizzard);
        assert_eq!(ConditionCode::from_description("Heavy snow storm"), ConditionCode::Blizzard);
        assert_eq!(
            ConditionCode::from_description("Winter Storm Warning"),
            ConditionCode::Blizzard
        );
        assert_eq!(ConditionCode::from_description("Ice Storm"), ConditionCode::FreezingRain);
        assert_eq!(ConditionCode::from_description("Storm"), ConditionCode::Thunderstorm);
    }

    #[test]
    fn unknown_reading_has_zero_confidence() {
        let reading = ConsensusReading::unknown(Location::named("Paris"), Utc::now());
        assert!(reading.is_unknown());
        assert_eq!(reading.confidence_score, 0.0);
        assert_eq!(reading.source_count(), 0);
    }
}
