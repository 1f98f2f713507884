//! Snapshot store abstractions.
//!
//! The document store sits behind a narrow read/write contract: three
//! logical collections, all append-only except for the notification read
//! flag. Single-document writes are the atomicity unit; nothing spans
//! multiple records.
//!
//! - snapshots: append-only, queried by "most recent"
//! - change events: append-only, queried by recent time window for dedup
//! - notifications: append-only, mutable only on the read flag

pub mod local;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ChangeEvent, NotificationRecord, ScheduleSnapshot};

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;

/// Trait for snapshot store backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot with the most recent capture timestamp.
    async fn latest_snapshot(&self) -> Result<Option<ScheduleSnapshot>>;

    /// Persist a new snapshot. Supersedes the current one; never deletes.
    async fn put_snapshot(&self, snapshot: &ScheduleSnapshot) -> Result<()>;

    /// Append accepted change events.
    async fn append_events(&self, events: &[ChangeEvent]) -> Result<()>;

    /// Load change events recorded at or after `since`.
    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<ChangeEvent>>;

    /// Append notification records.
    async fn append_notifications(&self, notifications: &[NotificationRecord]) -> Result<()>;

    /// Load notifications, newest first.
    async fn notifications(&self, unread_only: bool) -> Result<Vec<NotificationRecord>>;

    /// Flip the read flag on one notification. Returns false if unknown.
    async fn mark_notification_read(&self, id: &str) -> Result<bool>;
}
