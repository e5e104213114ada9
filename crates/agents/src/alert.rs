//! Alert agent - subscription setup and on-demand checks.

use async_trait::async_trait;
use futures::future::join_all;
use nimbus_alerts::{
    activity_recommendations, AlertEvaluator, AlertsConfig, ConditionsProvider,
    SubscriptionStore,
};
use nimbus_common::{
    Activity, Agent, AgentConfig, AgentOutput, AlertEvent, AlertSubscription, AlertType,
    IntentTag, Metric, NewSubscription, Query, Result, SoftFailure,
};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, LazyLock};
use tracing::info;

/// Phrasing that asks for a standing subscription rather than a one-off check.
static SETUP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(set\s*up|setup|create|subscribe|monitor|notify|watch|track|keep\s+an?\s+eye)\b")
        .expect("setup pattern is valid")
});

pub struct AlertAgent {
    config: AgentConfig,
    evaluator: Arc<AlertEvaluator>,
    conditions: Arc<dyn ConditionsProvider>,
    defaults: AlertsConfig,
}

impl AlertAgent {
    pub fn new(
        config: AgentConfig,
        evaluator: Arc<AlertEvaluator>,
        conditions: Arc<dyn ConditionsProvider>,
        defaults: AlertsConfig,
    ) -> Self {
        Self {
            config,
            evaluator,
            conditions,
            defaults,
        }
    }

    pub fn with_default_config(
        evaluator: Arc<AlertEvaluator>,
        conditions: Arc<dyn ConditionsProvider>,
        defaults: AlertsConfig,
    ) -> Self {
        Self::new(
            AgentConfig::new("alerts", "Smart Alert Agent"),
            evaluator,
            conditions,
            defaults,
        )
    }

    fn store(&self) -> &Arc<dyn SubscriptionStore> {
        self.evaluator.store()
    }

    fn owner<'a>(&'a self, query: &'a Query) -> &'a str {
        query
            .owner
            .as_deref()
            .filter(|o| !o.trim().is_empty())
            .unwrap_or(&self.defaults.default_owner)
    }

    /// Request for a new subscription: query thresholds override defaults.
    fn subscription_request(&self, query: &Query) -> NewSubscription {
        let mut thresholds: HashMap<String, f64> = HashMap::from([
            (
                Metric::TemperatureHigh.as_str().to_string(),
                self.defaults.default_temperature_high,
            ),
            (
                Metric::TemperatureLow.as_str().to_string(),
                self.defaults.default_temperature_low,
            ),
        ]);
        for (metric, value) in &query.extracted_thresholds {
            thresholds.insert(metric.as_str().to_string(), *value);
        }

        let mut alert_types = vec![AlertType::SevereWeather, AlertType::TemperatureExtreme];
        if query
            .activities
            .iter()
            .any(|a| matches!(a, Activity::Travel | Activity::Commute))
        {
            alert_types.push(AlertType::TravelDisruption);
        }
        if query.extracted_thresholds.contains_key(&Metric::WindSpeed) {
            alert_types.push(AlertType::HighWind);
        }
        if query.extracted_thresholds.contains_key(&Metric::HumidityHigh)
            || query.extracted_thresholds.contains_key(&Metric::HumidityLow)
        {
            alert_types.push(AlertType::Humidity);
        }

        NewSubscription {
            owner: self.owner(query).to_string(),
            locations: query
                .extracted_locations
                .iter()
                .map(|l| l.as_str().to_string())
                .collect(),
            alert_types: alert_types.iter().map(|t| t.as_str().to_string()).collect(),
            thresholds,
            activities: query.activities.iter().copied().collect(),
        }
    }

    async fn set_up(&self, query: &Query) -> Result<AgentOutput> {
        if query.extracted_locations.is_empty() {
            return Ok(AgentOutput::clarification(
                self.id(),
                self.capability(),
                "Which locations should I monitor?",
            ));
        }

        let subscription = self.store().create(self.subscription_request(query)).await?;
        info!(
            agent = %self.id(),
            subscription_id = %subscription.subscription_id,
            owner = %subscription.owner,
            "Alert subscription set up"
        );

        let mut output = AgentOutput::new(self.id(), self.capability(), describe_subscription(&subscription));
        output.subscription = Some(subscription);
        Ok(output)
    }

    async fn check(&self, query: &Query) -> Result<AgentOutput> {
        let owner = self.owner(query);
        let subscriptions = self.store().list_by_owner(owner).await?;

        if subscriptions.is_empty() {
            if query.extracted_locations.is_empty() {
                return Ok(AgentOutput::clarification(
                    self.id(),
                    self.capability(),
                    "You have no alert subscriptions. Which location should I check or monitor?",
                ));
            }
            return self.check_locations(query).await;
        }

        let outcomes = self.evaluator.evaluate_owner(owner).await?;
        let mut output = AgentOutput::new(self.id(), self.capability(), String::new());
        let mut activities: BTreeSet<Activity> = query.activities.clone();
        for subscription in &subscriptions {
            activities.extend(subscription.activities.iter().copied());
        }

        for outcome in outcomes {
            output.alert_events.extend(outcome.events);
            output.soft_failures.extend(outcome.soft_failures);
            for reading in outcome.readings {
                push_unique(&mut output.recommendations, activity_recommendations(&reading, &activities));
                output.readings.push(reading);
            }
        }

        output.narrative = describe_events(&output.alert_events, subscriptions.len());
        Ok(output)
    }

    /// One-off check of the query's locations against default thresholds.
    /// Nothing is stored and no cool-down applies.
    async fn check_locations(&self, query: &Query) -> Result<AgentOutput> {
        let mut one_off = AlertSubscription::create(self.subscription_request(query), chrono::Utc::now())?;
        one_off.subscription_id = "one-off".to_string();

        let lookups = query
            .extracted_locations
            .iter()
            .map(|location| async move { (location, self.conditions.current_conditions(location).await) });

        let mut output = AgentOutput::new(self.id(), self.capability(), String::new());
        let now = chrono::Utc::now();
        for (location, result) in join_all(lookups).await {
            match result {
                Ok(reading) => {
                    output
                        .alert_events
                        .extend(nimbus_alerts::evaluator::crossings(&one_off, &reading, now));
                    push_unique(
                        &mut output.recommendations,
                        activity_recommendations(&reading, &query.activities),
                    );
                    output.readings.push(reading);
                }
                Err(e) => output.soft_failures.push(
                    SoftFailure::new(format!("agent:{}", self.id()), e.to_string())
                        .for_target(location.as_str()),
                ),
            }
        }

        output.narrative = describe_events(&output.alert_events, 0);
        Ok(output)
    }
}

fn push_unique(into: &mut Vec<String>, advice: Vec<String>) {
    for line in advice {
        if !into.contains(&line) {
            into.push(line);
        }
    }
}

fn describe_subscription(subscription: &AlertSubscription) -> String {
    let locations: Vec<&str> = subscription.locations.iter().map(|l| l.as_str()).collect();
    let types: Vec<&str> = subscription.alert_types.iter().map(|t| t.as_str()).collect();
    let thresholds: Vec<String> = subscription
        .thresholds
        .iter()
        .map(|(m, v)| format!("{m} {v:.0}{}", m.unit()))
        .collect();
    format!(
        "Monitoring {} for {} (thresholds: {}). Subscription {}",
        locations.join(", "),
        types.join(", "),
        thresholds.join(", "),
        subscription.subscription_id
    )
}

fn describe_events(events: &[AlertEvent], subscriptions: usize) -> String {
    let mut lines = Vec::new();
    if events.is_empty() {
        lines.push("No active weather alerts.".to_string());
    } else {
        lines.push(format!("{} active alert(s):", events.len()));
        lines.extend(events.iter().map(|e| format!("- [{:?}] {}", e.severity, e.summary())));
    }
    if subscriptions > 0 {
        lines.push(format!("Checked {subscriptions} subscription(s)."));
    }
    lines.join("\n")
}

/// Whether the text asks to set up monitoring.
pub fn wants_subscription(text: &str) -> bool {
    SETUP_PATTERN.is_match(text)
}

#[async_trait]
impl Agent for AlertAgent {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn capability(&self) -> IntentTag {
        IntentTag::Alerts
    }

    async fn handle(&self, query: &Query) -> Result<AgentOutput> {
        info!(agent = %self.id(), owner = %self.owner(query), "Processing alert request");
        if wants_subscription(&query.raw_text) {
            self.set_up(query).await
        } else {
            self.check(query).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_phrasing() {
        assert!(wants_subscription("Set up weather alerts for my commute"));
        assert!(wants_subscription("monitor Chicago for storms"));
        assert!(wants_subscription("Notify me if it drops below 30"));
        assert!(!wants_subscription("Any weather alerts for Boston?"));
    }
}
