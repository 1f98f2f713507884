//! Schedule snapshot structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CourtSessionRecord;

/// One full, immutable capture of all court records at a poll time.
///
/// Snapshots are append-only: a new poll supersedes the previous snapshot but
/// never mutates or deletes it. The "current" snapshot is the one with the
/// most recent `captured_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    /// Capture timestamp
    pub captured_at: DateTime<Utc>,

    /// Total record count
    pub count: usize,

    /// The records array
    pub records: Vec<CourtSessionRecord>,
}

impl ScheduleSnapshot {
    /// Create a snapshot captured now.
    pub fn new(records: Vec<CourtSessionRecord>) -> Self {
        Self::at(Utc::now(), records)
    }

    /// Create a snapshot with an explicit capture time.
    pub fn at(captured_at: DateTime<Utc>, records: Vec<CourtSessionRecord>) -> Self {
        Self {
            captured_at,
            count: records.len(),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tracks_records() {
        let snapshot = ScheduleSnapshot::new(vec![
            CourtSessionRecord::not_in_session("1"),
            CourtSessionRecord::not_in_session("7"),
        ]);
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.records.len(), 2);
    }
}
