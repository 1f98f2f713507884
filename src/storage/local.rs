//! Local filesystem store.
//!
//! JSON-file backend for development and single-host deployments.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── current.json          # Latest snapshot (superseded, never mutated)
//! ├── snapshots/            # Append-only snapshot history
//! │   └── {timestamp}.json
//! ├── events.json           # Recent change events (pruned by age)
//! └── notifications.json    # Notifications (read flag is the only mutation)
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ChangeEvent, NotificationRecord, ScheduleSnapshot};
use crate::storage::SnapshotStore;

/// Change events older than this are pruned on append; the dedup window is
/// far shorter, so aged-out entries can never affect a verdict.
const EVENT_RETENTION_HOURS: i64 = 24;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root_dir: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Archive key for a snapshot.
    fn snapshot_key(captured_at: DateTime<Utc>) -> String {
        format!("snapshots/{}.json", captured_at.format("%Y%m%dT%H%M%S%3f"))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SnapshotStore for LocalStore {
    async fn latest_snapshot(&self) -> Result<Option<ScheduleSnapshot>> {
        self.read_json("current.json").await
    }

    async fn put_snapshot(&self, snapshot: &ScheduleSnapshot) -> Result<()> {
        // History entry first, pointer second; a crash between the two
        // leaves the previous snapshot current, never a dangling pointer.
        self.write_json(&Self::snapshot_key(snapshot.captured_at), snapshot)
            .await?;
        self.write_json("current.json", snapshot).await
    }

    async fn append_events(&self, events: &[ChangeEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut stored: Vec<ChangeEvent> =
            self.read_json("events.json").await?.unwrap_or_default();

        let cutoff = Utc::now() - Duration::hours(EVENT_RETENTION_HOURS);
        stored.retain(|e| e.timestamp >= cutoff);
        stored.extend_from_slice(events);

        self.write_json("events.json", &stored).await
    }

    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<ChangeEvent>> {
        let stored: Vec<ChangeEvent> =
            self.read_json("events.json").await?.unwrap_or_default();
        Ok(stored.into_iter().filter(|e| e.timestamp >= since).collect())
    }

    async fn append_notifications(&self, notifications: &[NotificationRecord]) -> Result<()> {
        if notifications.is_empty() {
            return Ok(());
        }
        let mut stored: Vec<NotificationRecord> =
            self.read_json("notifications.json").await?.unwrap_or_default();
        stored.extend_from_slice(notifications);
        self.write_json("notifications.json", &stored).await
    }

    async fn notifications(&self, unread_only: bool) -> Result<Vec<NotificationRecord>> {
        let mut stored: Vec<NotificationRecord> =
            self.read_json("notifications.json").await?.unwrap_or_default();
        if unread_only {
            stored.retain(|n| !n.read);
        }
        stored.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(stored)
    }

    async fn mark_notification_read(&self, id: &str) -> Result<bool> {
        let mut stored: Vec<NotificationRecord> =
            self.read_json("notifications.json").await?.unwrap_or_default();
        let Some(record) = stored.iter_mut().find(|n| n.id == id) else {
            return Ok(false);
        };
        record.read = true;
        self.write_json("notifications.json", &stored).await?;
        Ok(true)
    }
}
