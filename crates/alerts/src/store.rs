//! Subscription storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nimbus_common::{AlertSubscription, NewSubscription, NimbusError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// CRUD over alert subscriptions.
///
/// Reads may run concurrently; writes to one `subscription_id` are
/// serialized. `update` is for user edits and is rejected with
/// `VersionConflict` when the caller's copy is stale.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create(&self, request: NewSubscription) -> Result<AlertSubscription>;

    async fn get(&self, subscription_id: &str) -> Result<AlertSubscription>;

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<AlertSubscription>>;

    async fn list_all(&self) -> Result<Vec<AlertSubscription>>;

    /// Record an evaluation pass. `triggered_at` is set only when the pass
    /// emitted at least one event. Timestamps never move backwards.
    async fn update_timestamps(
        &self,
        subscription_id: &str,
        evaluated_at: DateTime<Utc>,
        triggered_at: Option<DateTime<Utc>>,
    ) -> Result<AlertSubscription>;

    /// Replace the user-editable fields. `subscription.version` must match
    /// the stored version.
    async fn update(&self, subscription: AlertSubscription) -> Result<AlertSubscription>;

    async fn delete(&self, subscription_id: &str) -> Result<()>;

    /// Returns the number of subscriptions removed.
    async fn delete_by_owner(&self, owner: &str) -> Result<usize>;
}

type Entry = Arc<Mutex<AlertSubscription>>;

/// Process-local store. Each subscription sits behind its own lock so a
/// slow write to one does not block the others.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, subscription_id: &str) -> Result<Entry> {
        self.entries
            .read()
            .await
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| NimbusError::SubscriptionNotFound(subscription_id.to_string()))
    }

    async fn snapshot(&self, filter: impl Fn(&AlertSubscription) -> bool) -> Vec<AlertSubscription> {
        let entries: Vec<Entry> = self.entries.read().await.values().cloned().collect();
        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            let sub = entry.lock().await;
            if filter(&sub) {
                result.push(sub.clone());
            }
        }
        result.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.subscription_id.cmp(&b.subscription_id))
        });
        result
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn create(&self, request: NewSubscription) -> Result<AlertSubscription> {
        let subscription = AlertSubscription::create(request, Utc::now())?;
        info!(
            subscription_id = %subscription.subscription_id,
            owner = %subscription.owner,
            locations = subscription.locations.len(),
            thresholds = subscription.thresholds.len(),
            "Subscription created"
        );
        self.entries.write().await.insert(
            subscription.subscription_id.clone(),
            Arc::new(Mutex::new(subscription.clone())),
        );
        Ok(subscription)
    }

    async fn get(&self, subscription_id: &str) -> Result<AlertSubscription> {
        let entry = self.entry(subscription_id).await?;
        let sub = entry.lock().await;
        Ok(sub.clone())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<AlertSubscription>> {
        Ok(self.snapshot(|s| s.owner == owner).await)
    }

    async fn list_all(&self) -> Result<Vec<AlertSubscription>> {
        Ok(self.snapshot(|_| true).await)
    }

    async fn update_timestamps(
        &self,
        subscription_id: &str,
        evaluated_at: DateTime<Utc>,
        triggered_at: Option<DateTime<Utc>>,
    ) -> Result<AlertSubscription> {
        let entry = self.entry(subscription_id).await?;
        let mut sub = entry.lock().await;
        sub.last_evaluated_at = sub.last_evaluated_at.max(evaluated_at);
        if let Some(at) = triggered_at {
            sub.last_triggered_at = Some(sub.last_triggered_at.map_or(at, |prev| prev.max(at)));
        }
        Ok(sub.clone())
    }

    async fn update(&self, subscription: AlertSubscription) -> Result<AlertSubscription> {
        subscription.validate()?;

        let entry = self.entry(&subscription.subscription_id).await?;
        let mut stored = entry.lock().await;
        if stored.version != subscription.version {
            return Err(NimbusError::VersionConflict {
                id: subscription.subscription_id,
                expected: subscription.version,
                found: stored.version,
            });
        }

        stored.locations = subscription.locations;
        stored.alert_types = subscription.alert_types;
        stored.thresholds = subscription.thresholds;
        stored.activities = subscription.activities;
        stored.active = subscription.active;
        stored.version += 1;

        debug!(subscription_id = %stored.subscription_id, version = stored.version, "Subscription updated");
        Ok(stored.clone())
    }

    async fn delete(&self, subscription_id: &str) -> Result<()> {
        match self.entries.write().await.remove(subscription_id) {
            Some(_) => {
                info!(subscription_id = %subscription_id, "Subscription deleted");
                Ok(())
            }
            None => Err(NimbusError::SubscriptionNotFound(subscription_id.to_string())),
        }
    }

    async fn delete_by_owner(&self, owner: &str) -> Result<usize> {
        let owned: Vec<String> = self
            .list_by_owner(owner)
            .await?
            .into_iter()
            .map(|s| s.subscription_id)
            .collect();

        let mut entries = self.entries.write().await;
        let removed = owned.iter().filter(|id| entries.remove(*id).is_some()).count();
        info!(owner = %owner, removed, "Subscriptions deleted for owner");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_common::{Location, Metric};
    use std::collections::HashMap;

    fn request(owner: &str, location: &str) -> NewSubscription {
        NewSubscription {
            owner: owner.into(),
            locations: vec![location.into()],
            thresholds: HashMap::from([("temperature_high".to_string(), 85.0)]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_get_delete() {
        let store = InMemorySubscriptionStore::new();
        let sub = store.create(request("ana", "Denver")).await.unwrap();

        let fetched = store.get(&sub.subscription_id).await.unwrap();
        assert_eq!(fetched, sub);

        store.delete(&sub.subscription_id).await.unwrap();
        let err = store.get(&sub.subscription_id).await.unwrap_err();
        assert!(matches!(err, NimbusError::SubscriptionNotFound(_)));
        assert!(store.delete(&sub.subscription_id).await.is_err());
    }

    #[tokio::test]
    async fn invalid_request_is_not_stored() {
        let store = InMemorySubscriptionStore::new();
        let mut bad = request("ana", "Denver");
        bad.thresholds.insert("pollen".into(), 3.0);
        assert!(matches!(
            store.create(bad).await,
            Err(NimbusError::ThresholdConfigInvalid(_))
        ));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_by_owner_filters() {
        let store = InMemorySubscriptionStore::new();
        store.create(request("ana", "Denver")).await.unwrap();
        store.create(request("ana", "Austin")).await.unwrap();
        store.create(request("ben", "Boise")).await.unwrap();

        assert_eq!(store.list_by_owner("ana").await.unwrap().len(), 2);
        assert_eq!(store.list_all().await.unwrap().len(), 3);
        assert_eq!(store.delete_by_owner("ana").await.unwrap(), 2);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn timestamps_only_move_forward() {
        let store = InMemorySubscriptionStore::new();
        let sub = store.create(request("ana", "Denver")).await.unwrap();
        let later = sub.created_at + chrono::Duration::minutes(5);

        let updated = store
            .update_timestamps(&sub.subscription_id, later, Some(later))
            .await
            .unwrap();
        assert_eq!(updated.last_evaluated_at, later);
        assert_eq!(updated.last_triggered_at, Some(later));

        let stale = store
            .update_timestamps(&sub.subscription_id, sub.created_at, None)
            .await
            .unwrap();
        assert_eq!(stale.last_evaluated_at, later);
        assert_eq!(stale.last_triggered_at, Some(later));
        assert_eq!(stale.version, sub.version);
    }

    #[tokio::test]
    async fn stale_edit_is_rejected() {
        let store = InMemorySubscriptionStore::new();
        let sub = store.create(request("ana", "Denver")).await.unwrap();

        let mut first = sub.clone();
        first.thresholds.insert(Metric::WindSpeed, 40.0);
        let saved = store.update(first).await.unwrap();
        assert_eq!(saved.version, 1);

        let mut second = sub.clone();
        second.locations.insert(Location::named("Reno"));
        let err = store.update(second).await.unwrap_err();
        assert!(matches!(
            err,
            NimbusError::VersionConflict { expected: 0, found: 1, .. }
        ));
    }

    #[tokio::test]
    async fn edit_with_non_finite_threshold_is_rejected() {
        let store = InMemorySubscriptionStore::new();
        let sub = store.create(request("ana", "Denver")).await.unwrap();

        let mut edit = sub.clone();
        edit.thresholds.insert(Metric::TemperatureLow, f64::NAN);
        let err = store.update(edit).await.unwrap_err();
        assert!(matches!(err, NimbusError::ThresholdConfigInvalid(_)));

        let mut emptied = sub.clone();
        emptied.locations.clear();
        let err = store.update(emptied).await.unwrap_err();
        assert!(matches!(err, NimbusError::InvalidSubscription(_)));

        let stored = store.get(&sub.subscription_id).await.unwrap();
        assert_eq!(stored.version, 0);
        assert_eq!(stored.thresholds, sub.thresholds);
    }

    #[tokio::test]
    async fn concurrent_timestamp_writes_serialize() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let sub = store.create(request("ana", "Denver")).await.unwrap();

        let handles: Vec<_> = (1..=20)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = sub.subscription_id.clone();
                let at = sub.created_at + chrono::Duration::seconds(i);
                tokio::spawn(async move { store.update_timestamps(&id, at, None).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get(&sub.subscription_id).await.unwrap();
        assert_eq!(stored.last_evaluated_at, sub.created_at + chrono::Duration::seconds(20));
    }
}
