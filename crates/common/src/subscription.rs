//! Alert subscriptions and the events they produce.

use crate::error::{NimbusError, Result};
use crate::observation::{ConditionCode, Location};
use crate::query::{Activity, Metric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Kinds of alerts a subscription can monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    TemperatureExtreme,
    HighWind,
    Humidity,
    /// Condition-type: matches the severe condition set.
    SevereWeather,
    /// Condition-type: matches conditions that disrupt travel.
    TravelDisruption,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TemperatureExtreme => "temperature_extreme",
            Self::HighWind => "high_wind",
            Self::Humidity => "humidity",
            Self::SevereWeather => "severe_weather",
            Self::TravelDisruption => "travel_disruption",
        }
    }

    /// Whether this type triggers on a categorical condition match.
    pub fn is_condition_type(self) -> bool {
        matches!(self, Self::SevereWeather | Self::TravelDisruption)
    }

    pub fn matches_condition(self, condition: ConditionCode) -> bool {
        match self {
            Self::SevereWeather => condition.is_severe(),
            Self::TravelDisruption => condition.disrupts_travel(),
            _ => false,
        }
    }
}

impl FromStr for AlertType {
    type Err = NimbusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "temperature_extreme" => Ok(Self::TemperatureExtreme),
            "high_wind" => Ok(Self::HighWind),
            "humidity" => Ok(Self::Humidity),
            "severe_weather" => Ok(Self::SevereWeather),
            "travel_disruption" => Ok(Self::TravelDisruption),
            other => Err(NimbusError::InvalidSubscription(format!(
                "unknown alert type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's request to create a subscription, as received from outside.
///
/// Keys are raw strings; validation happens in [`AlertSubscription::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSubscription {
    pub owner: String,
    pub locations: Vec<String>,
    #[serde(default)]
    pub alert_types: Vec<String>,
    #[serde(default)]
    pub thresholds: HashMap<String, f64>,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

/// A standing request to monitor locations against thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSubscription {
    pub subscription_id: String,
    pub owner: String,
    pub locations: BTreeSet<Location>,
    pub alert_types: BTreeSet<AlertType>,
    pub thresholds: BTreeMap<Metric, f64>,
    pub created_at: DateTime<Utc>,
    pub last_evaluated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub activities: BTreeSet<Activity>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Bumped on every user edit, which must present the current value.
    /// Evaluation timestamps do not change it.
    #[serde(default)]
    pub version: u64,
}

fn default_active() -> bool {
    true
}

impl AlertSubscription {
    /// Validate a creation request.
    ///
    /// Unknown threshold keys are rejected here with `ThresholdConfigInvalid`
    /// so evaluation never sees them.
    pub fn create(request: NewSubscription, now: DateTime<Utc>) -> Result<Self> {
        let owner = request.owner.trim().to_string();
        if owner.is_empty() {
            return Err(NimbusError::InvalidSubscription("owner is empty".into()));
        }

        let locations: BTreeSet<Location> = request
            .locations
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(Location::named)
            .collect();
        if locations.is_empty() {
            return Err(NimbusError::InvalidSubscription(
                "a subscription needs at least one location".into(),
            ));
        }

        let mut thresholds = BTreeMap::new();
        for (key, value) in &request.thresholds {
            let metric: Metric = key.parse()?;
            if !value.is_finite() {
                return Err(NimbusError::ThresholdConfigInvalid(format!(
                    "threshold '{key}' is not a finite number"
                )));
            }
            thresholds.insert(metric, *value);
        }

        let alert_types = request
            .alert_types
            .iter()
            .map(|t| t.parse::<AlertType>())
            .collect::<Result<BTreeSet<_>>>()?;

        if thresholds.is_empty() && alert_types.iter().all(|t| !t.is_condition_type()) {
            return Err(NimbusError::InvalidSubscription(
                "nothing to monitor: no thresholds and no condition alert types".into(),
            ));
        }

        Ok(Self {
            subscription_id: format!("sub_{}", uuid::Uuid::new_v4()),
            owner,
            locations,
            alert_types,
            thresholds,
            created_at: now,
            last_evaluated_at: now,
            last_triggered_at: None,
            activities: request.activities.into_iter().collect(),
            active: true,
            version: 0,
        })
    }

    /// Re-check an edited subscription against the rules `create` enforces.
    pub fn validate(&self) -> Result<()> {
        if self.locations.is_empty() {
            return Err(NimbusError::InvalidSubscription(
                "a subscription needs at least one location".into(),
            ));
        }
        if let Some((metric, _)) = self.thresholds.iter().find(|(_, v)| !v.is_finite()) {
            return Err(NimbusError::ThresholdConfigInvalid(format!(
                "threshold '{metric}' is not a finite number"
            )));
        }
        if self.thresholds.is_empty() && self.condition_alert_types().next().is_none() {
            return Err(NimbusError::InvalidSubscription(
                "nothing to monitor: no thresholds and no condition alert types".into(),
            ));
        }
        Ok(())
    }

    pub fn threshold(&self, metric: Metric) -> Option<f64> {
        self.thresholds.get(&metric).copied()
    }

    pub fn condition_alert_types(&self) -> impl Iterator<Item = AlertType> + '_ {
        self.alert_types
            .iter()
            .copied()
            .filter(|t| t.is_condition_type())
    }
}

/// Direction in which a threshold was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ExceededHigh,
    ExceededLow,
    ConditionMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// What an alert event was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum AlertMetric {
    Threshold(Metric),
    Condition(AlertType),
}

impl fmt::Display for AlertMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threshold(m) => write!(f, "{m}"),
            Self::Condition(t) => write!(f, "{t}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservedValue {
    Numeric(f64),
    Condition(ConditionCode),
}

impl fmt::Display for ObservedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{v:.1}"),
            Self::Condition(c) => write!(f, "{c}"),
        }
    }
}

/// A single notification-worthy threshold crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub subscription_id: String,
    pub location: Location,
    pub metric: AlertMetric,
    pub observed_value: ObservedValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_value: Option<f64>,
    pub direction: Direction,
    pub triggered_at: DateTime<Utc>,
    pub severity: AlertSeverity,
    /// Confidence of the reading that triggered the event.
    pub confidence: f64,
}

impl AlertEvent {
    pub fn summary(&self) -> String {
        match (self.direction, self.threshold_value) {
            (Direction::ConditionMatch, _) => format!(
                "{}: {} conditions ({})",
                self.location, self.observed_value, self.metric
            ),
            (Direction::ExceededHigh, Some(t)) => format!(
                "{}: {} at {} is above {:.1}",
                self.location, self.metric, self.observed_value, t
            ),
            (Direction::ExceededLow, Some(t)) => format!(
                "{}: {} at {} is below {:.1}",
                self.location, self.metric, self.observed_value, t
            ),
            (_, None) => format!("{}: {} at {}", self.location, self.metric, self.observed_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewSubscription {
        NewSubscription {
            owner: "dana".into(),
            locations: vec!["San Francisco".into(), "new york".into()],
            alert_types: vec!["severe_weather".into()],
            thresholds: HashMap::from([("temperature_high".to_string(), 85.0)]),
            activities: vec![Activity::Commute],
        }
    }

    #[test]
    fn create_validates_and_normalizes() {
        let sub = AlertSubscription::create(request(), Utc::now()).unwrap();
        assert!(sub.subscription_id.starts_with("sub_"));
        assert!(sub.locations.contains(&Location::named("New York")));
        assert_eq!(sub.threshold(Metric::TemperatureHigh), Some(85.0));
        assert_eq!(sub.last_evaluated_at, sub.created_at);
        assert!(sub.last_triggered_at.is_none());
        assert!(sub.active);
    }

    #[test]
    fn unknown_metric_rejected_at_creation() {
        let mut req = request();
        req.thresholds.insert("dew_point".into(), 60.0);
        let err = AlertSubscription::create(req, Utc::now()).unwrap_err();
        assert!(matches!(err, NimbusError::ThresholdConfigInvalid(_)));
    }

    #[test]
    fn empty_locations_rejected() {
        let mut req = request();
        req.locations = vec!["   ".into()];
        let err = AlertSubscription::create(req, Utc::now()).unwrap_err();
        assert!(matches!(err, NimbusError::InvalidSubscription(_)));
    }

    #[test]
    fn unknown_alert_type_rejected() {
        let mut req = request();
        req.alert_types.push("locusts".into());
        assert!(AlertSubscription::create(req, Utc::now()).is_err());
    }

    #[test]
    fn alert_metric_serialization_is_tagged() {
        let json = serde_json::to_value(AlertMetric::Threshold(Metric::WindSpeed)).unwrap();
        assert_eq!(json["kind"], "threshold");
        assert_eq!(json["name"], "wind_speed");
    }
}
