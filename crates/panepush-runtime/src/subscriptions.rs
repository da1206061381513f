//! Subscription store backed by a JSON file.
//!
//! `list` re-reads the file on every call so edits made by other processes
//! are picked up by the next dispatch. Writes go through a temp file and a
//! rename so readers never see a half-written document.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use panepush_core::types::{NotificationSubscription, SubscriptionUpsert};
use panepush_dispatch::{StoreError, SubscriptionStore, apply_upsert};
use tokio::sync::Mutex;

pub struct JsonFileSubscriptionStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileSubscriptionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<NotificationSubscription>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write(&self, subscriptions: &[NotificationSubscription]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut body = serde_json::to_vec_pretty(subscriptions)?;
        body.push(b'\n');

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for JsonFileSubscriptionStore {
    async fn list(&self) -> Result<Vec<NotificationSubscription>, StoreError> {
        self.read().await
    }

    async fn upsert(&self, input: SubscriptionUpsert) -> Result<NotificationSubscription, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.read().await?;
        let stored = apply_upsert(&mut all, input);
        self.write(&all).await?;
        Ok(stored)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.read().await?;
        let before = all.len();
        all.retain(|s| s.id != id);
        if all.len() == before {
            return Ok(false);
        }
        self.write(&all).await?;
        Ok(true)
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(&[]).await
    }

    async fn mark_delivered(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.read().await?;
        let Some(sub) = all.iter_mut().find(|s| s.id == id) else {
            return Ok(());
        };
        sub.last_delivered_at = Some(at);
        self.write(&all).await
    }
}
