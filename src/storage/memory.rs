//! In-memory store for tests and short-lived runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{ChangeEvent, NotificationRecord, ScheduleSnapshot};
use crate::storage::SnapshotStore;

#[derive(Debug, Default)]
struct Inner {
    snapshots: Vec<ScheduleSnapshot>,
    events: Vec<ChangeEvent>,
    notifications: Vec<NotificationRecord>,
}

/// Memory-backed snapshot store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots (history, not just current).
    pub async fn snapshot_count(&self) -> usize {
        self.inner.lock().await.snapshots.len()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn latest_snapshot(&self) -> Result<Option<ScheduleSnapshot>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .snapshots
            .iter()
            .max_by_key(|s| s.captured_at)
            .cloned())
    }

    async fn put_snapshot(&self, snapshot: &ScheduleSnapshot) -> Result<()> {
        self.inner.lock().await.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn append_events(&self, events: &[ChangeEvent]) -> Result<()> {
        self.inner.lock().await.events.extend_from_slice(events);
        Ok(())
    }

    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<ChangeEvent>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn append_notifications(&self, notifications: &[NotificationRecord]) -> Result<()> {
        self.inner
            .lock()
            .await
            .notifications
            .extend_from_slice(notifications);
        Ok(())
    }

    async fn notifications(&self, unread_only: bool) -> Result<Vec<NotificationRecord>> {
        let inner = self.inner.lock().await;
        let mut result: Vec<NotificationRecord> = inner
            .notifications
            .iter()
            .filter(|n| !unread_only || !n.read)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn mark_notification_read(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.notifications.iter_mut().find(|n| n.id == id) {
            Some(record) => {
                record.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
