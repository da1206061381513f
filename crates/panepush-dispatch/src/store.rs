//! Subscription store seam plus an in-memory implementation.
//!
//! The dispatcher reads the list fresh on every dispatch and only ever
//! writes `last_delivered_at` or removes a subscription.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use panepush_core::types::{NotificationSubscription, SubscriptionUpsert};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("subscription store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("subscription store is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Current subscriptions. Must reflect external mutations immediately.
    async fn list(&self) -> Result<Vec<NotificationSubscription>, StoreError>;

    async fn upsert(&self, input: SubscriptionUpsert) -> Result<NotificationSubscription, StoreError>;

    /// Returns `false` if no subscription had this id.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;

    async fn remove_all(&self) -> Result<(), StoreError>;

    async fn mark_delivered(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Insert or replace by `endpoint`. A replaced subscription keeps its id and
/// delivery timestamp; a new one gets a fresh UUID.
pub fn apply_upsert(
    subscriptions: &mut Vec<NotificationSubscription>,
    input: SubscriptionUpsert,
) -> NotificationSubscription {
    if let Some(existing) = subscriptions
        .iter_mut()
        .find(|s| s.endpoint == input.endpoint)
    {
        existing.device_id = input.device_id;
        existing.keys = input.keys;
        existing.scope = input.scope;
        existing.client = input.client;
        return existing.clone();
    }

    let created = NotificationSubscription {
        id: uuid::Uuid::new_v4().to_string(),
        device_id: input.device_id,
        endpoint: input.endpoint,
        keys: input.keys,
        scope: input.scope,
        client: input.client,
        last_delivered_at: None,
    };
    subscriptions.push(created.clone());
    created
}

#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    subscriptions: Mutex<Vec<NotificationSubscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriptions(subscriptions: Vec<NotificationSubscription>) -> Self {
        Self {
            subscriptions: Mutex::new(subscriptions),
        }
    }

    /// Replace the list wholesale, as an external writer would.
    pub fn replace(&self, subscriptions: Vec<NotificationSubscription>) {
        *self.lock() = subscriptions;
    }

    pub fn get(&self, id: &str) -> Option<NotificationSubscription> {
        self.lock().iter().find(|s| s.id == id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<NotificationSubscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn list(&self) -> Result<Vec<NotificationSubscription>, StoreError> {
        Ok(self.lock().clone())
    }

    async fn upsert(&self, input: SubscriptionUpsert) -> Result<NotificationSubscription, StoreError> {
        Ok(apply_upsert(&mut self.lock(), input))
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        Ok(subscriptions.len() != before)
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        self.lock().clear();
        Ok(())
    }

    async fn mark_delivered(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(sub) = self.lock().iter_mut().find(|s| s.id == id) {
            sub.last_delivered_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panepush_core::types::{ClientInfo, SubscriptionKeys, SubscriptionScope};

    fn upsert_input(endpoint: &str, device: &str) -> SubscriptionUpsert {
        SubscriptionUpsert {
            device_id: device.into(),
            endpoint: endpoint.into(),
            keys: SubscriptionKeys {
                p256dh: "p".into(),
                auth: "a".into(),
            },
            scope: SubscriptionScope::default(),
            client: ClientInfo {
                platform: "ios".into(),
                standalone: true,
            },
        }
    }

    #[tokio::test]
    async fn upsert_same_endpoint_keeps_id() {
        let store = MemorySubscriptionStore::new();
        let first = store
            .upsert(upsert_input("https://push/1", "dev-a"))
            .await
            .expect("upsert");
        let second = store
            .upsert(upsert_input("https://push/1", "dev-b"))
            .await
            .expect("upsert");

        assert_eq!(first.id, second.id);
        assert_eq!(second.device_id, "dev-b");
        assert_eq!(store.list().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn upsert_new_endpoint_adds() {
        let store = MemorySubscriptionStore::new();
        let a = store.upsert(upsert_input("https://push/1", "d")).await.expect("upsert");
        let b = store.upsert(upsert_input("https://push/2", "d")).await.expect("upsert");
        assert_ne!(a.id, b.id);
        assert_eq!(store.list().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let store = MemorySubscriptionStore::new();
        let sub = store.upsert(upsert_input("https://push/1", "d")).await.expect("upsert");
        assert!(store.remove(&sub.id).await.expect("remove"));
        assert!(!store.remove(&sub.id).await.expect("remove"));
    }

    #[tokio::test]
    async fn mark_delivered_sets_timestamp() {
        let store = MemorySubscriptionStore::new();
        let sub = store.upsert(upsert_input("https://push/1", "d")).await.expect("upsert");
        let at = Utc::now();
        store.mark_delivered(&sub.id, at).await.expect("mark");
        assert_eq!(store.get(&sub.id).and_then(|s| s.last_delivered_at), Some(at));
    }

    #[tokio::test]
    async fn remove_all_empties_store() {
        let store = MemorySubscriptionStore::new();
        store.upsert(upsert_input("https://push/1", "d")).await.expect("upsert");
        store.upsert(upsert_input("https://push/2", "d")).await.expect("upsert");
        store.remove_all().await.expect("clear");
        assert!(store.list().await.expect("list").is_empty());
    }
}
