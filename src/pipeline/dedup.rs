//! Duplicate-event suppression.
//!
//! Repeated detections of the same change within a fixed time bucket are
//! collapsed so a flapping upstream row does not flood notifications. The
//! bucket is `epoch_secs / bucket_width` (integer division), not a sliding
//! window, which keeps the verdict deterministic under wall-clock jitter.

use crate::models::ChangeEvent;

/// Stateless gate deciding whether an event repeats a recently recorded one.
#[derive(Debug, Clone, Copy)]
pub struct DedupFilter {
    bucket_secs: i64,
}

impl DedupFilter {
    /// Create a filter with the given bucket width in seconds.
    pub fn new(bucket_secs: u64) -> Self {
        Self {
            bucket_secs: bucket_secs.max(1) as i64,
        }
    }

    /// Bucket width in seconds.
    pub fn bucket_secs(&self) -> i64 {
        self.bucket_secs
    }

    /// Whether `event` duplicates one of `recent`.
    ///
    /// Two events are the same if they share `(court_number, change_type,
    /// case_number-if-any)` and land in the same bucket.
    pub fn is_duplicate(&self, event: &ChangeEvent, recent: &[ChangeEvent]) -> bool {
        let key = event.dedup_key();
        let bucket = event.bucket(self.bucket_secs);
        recent
            .iter()
            .any(|other| other.dedup_key() == key && other.bucket(self.bucket_secs) == bucket)
    }
}

impl Default for DedupFilter {
    fn default() -> Self {
        Self::new(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeType, CourtSessionRecord};
    use chrono::{TimeZone, Utc};

    fn added_event(court: &str, epoch_secs: i64) -> ChangeEvent {
        ChangeEvent {
            timestamp: Utc.timestamp_opt(epoch_secs, 0).unwrap(),
            court_number: court.to_string(),
            change_type: ChangeType::Added,
            previous: None,
            current: Some(CourtSessionRecord::not_in_session(court)),
            description: format!("Court {court} appeared in the schedule"),
        }
    }

    #[test]
    fn test_same_bucket_dedupes() {
        let filter = DedupFilter::new(60);
        // 59 seconds apart, both inside bucket [60, 120)
        let first = added_event("3", 60);
        let second = added_event("3", 119);
        assert!(filter.is_duplicate(&second, &[first]));
    }

    #[test]
    fn test_bucket_boundary_resets_verdict() {
        let filter = DedupFilter::new(60);
        // 61 seconds apart across the boundary at 120
        let first = added_event("3", 59);
        let second = added_event("3", 120);
        assert!(!filter.is_duplicate(&second, &[first]));
    }

    #[test]
    fn test_symmetric_within_bucket() {
        let filter = DedupFilter::new(60);
        let a = added_event("3", 61);
        let b = added_event("3", 118);
        assert!(filter.is_duplicate(&a, &[b.clone()]));
        assert!(filter.is_duplicate(&b, &[a]));
    }

    #[test]
    fn test_different_court_is_not_duplicate() {
        let filter = DedupFilter::new(60);
        let first = added_event("3", 60);
        let second = added_event("4", 61);
        assert!(!filter.is_duplicate(&second, &[first]));
    }

    #[test]
    fn test_different_change_type_is_not_duplicate() {
        let filter = DedupFilter::new(60);
        let first = added_event("3", 60);
        let mut second = added_event("3", 61);
        second.change_type = ChangeType::Removed;
        second.current = None;
        second.previous = Some(CourtSessionRecord::not_in_session("3"));
        assert!(!filter.is_duplicate(&second, &[first]));
    }

    #[test]
    fn test_empty_recent_is_never_duplicate() {
        let filter = DedupFilter::new(60);
        assert!(!filter.is_duplicate(&added_event("3", 60), &[]));
    }
}
