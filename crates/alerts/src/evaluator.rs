//! Threshold evaluation with cool-down.
//!
//! A pass over one subscription moves through
//! `Idle → Evaluating → (Triggered | Suppressed) → Idle`. Locations are
//! looked up concurrently; a failed lookup only costs that location.

use crate::sink::NotificationSink;
use crate::store::SubscriptionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use nimbus_common::{
    AlertEvent, AlertMetric, AlertSeverity, AlertSubscription, AlertType, ConditionCode,
    ConsensusReading, Direction, Location, NimbusError, ObservedValue, Result, SoftFailure,
    ThresholdSide,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Supplies current conditions for a location, usually by fusing every
/// configured source.
#[async_trait]
pub trait ConditionsProvider: Send + Sync {
    async fn current_conditions(&self, location: &Location) -> Result<ConsensusReading>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationState {
    Idle,
    Evaluating,
    Triggered,
    Suppressed,
}

/// Result of one pass over one subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub subscription_id: String,
    /// Events delivered in this pass.
    pub events: Vec<AlertEvent>,
    /// Readings the pass was based on, one per location that answered.
    pub readings: Vec<ConsensusReading>,
    pub soft_failures: Vec<SoftFailure>,
    /// `Triggered` or `Suppressed`.
    pub state: EvaluationState,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CooldownKey {
    subscription_id: String,
    location: Location,
    metric: AlertMetric,
    direction: Direction,
}

impl CooldownKey {
    fn of(event: &AlertEvent) -> Self {
        Self {
            subscription_id: event.subscription_id.clone(),
            location: event.location.clone(),
            metric: event.metric,
            direction: event.direction,
        }
    }
}

pub struct AlertEvaluator {
    store: Arc<dyn SubscriptionStore>,
    conditions: Arc<dyn ConditionsProvider>,
    sink: Arc<dyn NotificationSink>,
    cooldown: chrono::Duration,
    /// When each crossing last fired.
    ledger: Mutex<HashMap<CooldownKey, DateTime<Utc>>>,
    states: Mutex<HashMap<String, EvaluationState>>,
    /// Serializes passes over the same subscription.
    passes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AlertEvaluator {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        conditions: Arc<dyn ConditionsProvider>,
        sink: Arc<dyn NotificationSink>,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            conditions,
            sink,
            cooldown: chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX),
            ledger: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            passes: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// Current state of a subscription; `Idle` when no pass is running.
    pub fn state(&self, subscription_id: &str) -> EvaluationState {
        self.states
            .lock()
            .get(subscription_id)
            .copied()
            .unwrap_or(EvaluationState::Idle)
    }

    pub async fn evaluate(&self, subscription_id: &str) -> Result<EvaluationOutcome> {
        self.evaluate_at(subscription_id, Utc::now()).await
    }

    /// Evaluate one subscription as of `now`.
    pub async fn evaluate_at(
        &self,
        subscription_id: &str,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome> {
        self.prune_ledger(now);
        self.evaluate_one(subscription_id, now).await
    }

    async fn evaluate_one(
        &self,
        subscription_id: &str,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome> {
        let pass = Arc::clone(
            self.passes
                .lock()
                .entry(subscription_id.to_string())
                .or_default(),
        );

        let result = {
            let _guard = pass.lock().await;
            self.evaluate_locked(subscription_id, now).await
        };
        self.release_pass(subscription_id, &pass);

        if matches!(result, Err(NimbusError::SubscriptionNotFound(_))) {
            self.forget(subscription_id);
        }
        result
    }

    async fn evaluate_locked(
        &self,
        subscription_id: &str,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome> {
        let subscription = self.store.get(subscription_id).await?;
        self.set_state(subscription_id, EvaluationState::Evaluating);

        let outcome = self.run_pass(&subscription, now).await;

        let triggered_at = (!outcome.events.is_empty()).then_some(now);
        let stored = self
            .store
            .update_timestamps(subscription_id, now, triggered_at)
            .await;
        self.set_state(subscription_id, EvaluationState::Idle);
        stored?;

        Ok(outcome)
    }

    /// Drop the pass lock once nobody else is waiting on it.
    fn release_pass(&self, subscription_id: &str, pass: &Arc<tokio::sync::Mutex<()>>) {
        let mut passes = self.passes.lock();
        let ours = passes
            .get(subscription_id)
            .is_some_and(|current| Arc::ptr_eq(current, pass));
        // The map and this caller hold the only references.
        if ours && Arc::strong_count(pass) <= 2 {
            passes.remove(subscription_id);
        }
    }

    /// Forget cool-downs and state of a subscription that no longer exists.
    fn forget(&self, subscription_id: &str) {
        self.ledger
            .lock()
            .retain(|key, _| key.subscription_id != subscription_id);
        self.states.lock().remove(subscription_id);
        debug!(subscription_id = %subscription_id, "Forgot deleted subscription");
    }

    /// Drop cool-down entries that can no longer suppress anything.
    fn prune_ledger(&self, now: DateTime<Utc>) {
        self.ledger
            .lock()
            .retain(|_, fired| now.signed_duration_since(*fired) < self.cooldown);
    }

    /// Evaluate every active subscription concurrently.
    ///
    /// A subscription that disappears mid-pass is skipped.
    pub async fn evaluate_all(&self) -> Result<Vec<EvaluationOutcome>> {
        self.evaluate_all_at(Utc::now()).await
    }

    pub async fn evaluate_all_at(&self, now: DateTime<Utc>) -> Result<Vec<EvaluationOutcome>> {
        let subscriptions = self.store.list_all().await?;
        Ok(self.evaluate_many(subscriptions, now).await)
    }

    /// Evaluate one owner's active subscriptions.
    pub async fn evaluate_owner(&self, owner: &str) -> Result<Vec<EvaluationOutcome>> {
        let subscriptions = self.store.list_by_owner(owner).await?;
        Ok(self.evaluate_many(subscriptions, Utc::now()).await)
    }

    async fn evaluate_many(
        &self,
        subscriptions: Vec<AlertSubscription>,
        now: DateTime<Utc>,
    ) -> Vec<EvaluationOutcome> {
        self.prune_ledger(now);
        let active: Vec<_> = subscriptions.into_iter().filter(|s| s.active).collect();
        let passes = active
            .iter()
            .map(|s| self.evaluate_one(&s.subscription_id, now));

        let mut outcomes = Vec::with_capacity(active.len());
        for (subscription, result) in active.iter().zip(join_all(passes).await) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(
                    subscription_id = %subscription.subscription_id,
                    error = %e,
                    "Skipping subscription"
                ),
            }
        }
        outcomes
    }

    async fn run_pass(&self, subscription: &AlertSubscription, now: DateTime<Utc>) -> EvaluationOutcome {
        let lookups = subscription.locations.iter().map(|location| async move {
            (location, self.conditions.current_conditions(location).await)
        });

        let mut readings = Vec::new();
        let mut soft_failures = Vec::new();
        for (location, result) in join_all(lookups).await {
            match result {
                Ok(reading) if reading.is_unknown() => {
                    warn!(subscription_id = %subscription.subscription_id, location = %location, "No source reported conditions");
                    soft_failures.push(
                        SoftFailure::new("evaluator", "no source reported conditions")
                            .for_target(location.as_str()),
                    );
                }
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    warn!(subscription_id = %subscription.subscription_id, location = %location, error = %e, "Conditions lookup failed");
                    soft_failures.push(
                        SoftFailure::new("evaluator", e.to_string()).for_target(location.as_str()),
                    );
                }
            }
        }

        let crossings: Vec<AlertEvent> = readings
            .iter()
            .flat_map(|reading| crossings(subscription, reading, now))
            .collect();
        let candidates = crossings.len();

        let mut events = Vec::new();
        for event in crossings {
            let key = CooldownKey::of(&event);
            if self.cooling_down(&key, now) {
                debug!(subscription_id = %event.subscription_id, location = %event.location, metric = %event.metric, "Suppressed by cool-down");
                continue;
            }
            match self.sink.deliver(&event).await {
                Ok(()) => {
                    self.ledger.lock().insert(key, now);
                    events.push(event);
                }
                Err(e) => {
                    warn!(subscription_id = %event.subscription_id, error = %e, "Notification delivery failed");
                    soft_failures.push(
                        SoftFailure::new("sink", e.to_string()).for_target(event.location.as_str()),
                    );
                }
            }
        }

        let state = if events.is_empty() {
            EvaluationState::Suppressed
        } else {
            EvaluationState::Triggered
        };
        self.set_state(&subscription.subscription_id, state);

        info!(
            subscription_id = %subscription.subscription_id,
            locations = subscription.locations.len(),
            crossings = candidates,
            events = events.len(),
            failures = soft_failures.len(),
            state = ?state,
            "Subscription evaluated"
        );

        EvaluationOutcome {
            subscription_id: subscription.subscription_id.clone(),
            events,
            readings,
            soft_failures,
            state,
            evaluated_at: now,
        }
    }

    fn cooling_down(&self, key: &CooldownKey, now: DateTime<Utc>) -> bool {
        self.ledger
            .lock()
            .get(key)
            .is_some_and(|fired| now.signed_duration_since(*fired) < self.cooldown)
    }

    fn set_state(&self, subscription_id: &str, state: EvaluationState) {
        let mut states = self.states.lock();
        if state == EvaluationState::Idle {
            states.remove(subscription_id);
        } else {
            states.insert(subscription_id.to_string(), state);
        }
    }
}

/// Every threshold or condition the reading crosses for this subscription.
pub fn crossings(
    subscription: &AlertSubscription,
    reading: &ConsensusReading,
    now: DateTime<Utc>,
) -> Vec<AlertEvent> {
    let event = |metric, observed_value, threshold_value, direction, severity| AlertEvent {
        subscription_id: subscription.subscription_id.clone(),
        location: reading.location.clone(),
        metric,
        observed_value,
        threshold_value,
        direction,
        triggered_at: now,
        severity,
        confidence: reading.confidence_score,
    };

    let mut events = Vec::new();
    for (&metric, &threshold) in &subscription.thresholds {
        let value = metric.value_of(reading);
        let direction = match metric.side() {
            ThresholdSide::High if value > threshold => Direction::ExceededHigh,
            ThresholdSide::Low if value < threshold => Direction::ExceededLow,
            _ => continue,
        };
        events.push(event(
            AlertMetric::Threshold(metric),
            ObservedValue::Numeric(value),
            Some(threshold),
            direction,
            AlertSeverity::Medium,
        ));
    }

    for alert_type in subscription.condition_alert_types() {
        if alert_type.matches_condition(reading.condition) {
            events.push(event(
                AlertMetric::Condition(alert_type),
                ObservedValue::Condition(reading.condition),
                None,
                Direction::ConditionMatch,
                condition_severity(alert_type, reading.condition),
            ));
        }
    }
    events
}

fn condition_severity(alert_type: AlertType, condition: ConditionCode) -> AlertSeverity {
    match (alert_type, condition) {
        (_, ConditionCode::Tornado | ConditionCode::Hurricane) => AlertSeverity::Critical,
        (AlertType::SevereWeather, _) => AlertSeverity::High,
        _ => AlertSeverity::Medium,
    }
}
