//! Change events and notification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CourtSessionRecord;

/// Classification of a detected difference between two snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Updated,
    Removed,
    StatusChanged,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Updated => "updated",
            ChangeType::Removed => "removed",
            ChangeType::StatusChanged => "status_changed",
        }
    }
}

/// One detected difference between two snapshots for one court number.
///
/// Invariants: `Added` carries no `previous`; `Removed` carries no `current`;
/// `Updated` and `StatusChanged` carry both sides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Detection timestamp
    pub timestamp: DateTime<Utc>,

    /// Court number the change applies to
    pub court_number: String,

    /// Change classification
    pub change_type: ChangeType,

    /// Record before the change (absent for `Added`)
    pub previous: Option<CourtSessionRecord>,

    /// Record after the change (absent for `Removed`)
    pub current: Option<CourtSessionRecord>,

    /// Human-readable one-line description
    pub description: String,
}

impl ChangeEvent {
    /// Case number attached to the event, preferring the new side.
    pub fn case_number(&self) -> Option<&str> {
        self.current
            .as_ref()
            .and_then(|r| r.case_number())
            .or_else(|| self.previous.as_ref().and_then(|r| r.case_number()))
    }

    /// Deduplication identity: `(court_number, change_type, case_number)`.
    pub fn dedup_key(&self) -> (String, ChangeType, Option<String>) {
        (
            self.court_number.clone(),
            self.change_type,
            self.case_number().map(|s| s.to_string()),
        )
    }

    /// Fixed dedup bucket: epoch seconds integer-divided by the bucket width.
    ///
    /// Not a sliding window; two events dedupe only when they land in the
    /// same bucket.
    pub fn bucket(&self, bucket_secs: i64) -> i64 {
        debug_assert!(bucket_secs > 0);
        self.timestamp.timestamp().div_euclid(bucket_secs)
    }
}

/// Notification derived 1:1 from a change event that survived deduplication.
///
/// Immutable once created, except for the `read` flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecord {
    /// Stable id, derived from the originating event
    pub id: String,

    /// Court number (reference back to the event)
    pub court_number: String,

    /// Change classification of the originating event
    pub change_type: ChangeType,

    /// Timestamp of the originating event
    pub event_timestamp: DateTime<Utc>,

    /// Short title keyed by change type
    pub title: String,

    /// Rendered message body
    pub message: String,

    /// Read/unread flag
    pub read: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Derive the stable notification id for an event.
    pub fn id_for(event: &ChangeEvent) -> String {
        let mut hasher = Sha256::new();
        hasher.update(event.court_number.as_bytes());
        hasher.update(event.change_type.as_str().as_bytes());
        hasher.update(event.timestamp.timestamp_millis().to_be_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}
