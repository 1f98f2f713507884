//! Change detection between consecutive snapshots.
//!
//! Computes the classified difference between the previous and the new
//! record set for notification dispatch. Pure and deterministic: the set of
//! emitted events does not depend on input ordering.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{ChangeEvent, ChangeType, CourtSessionRecord};

/// Detector for classified snapshot differences.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Calculate the classified diff between two record sets.
    ///
    /// A court number present on both sides whose session status flips
    /// yields exactly one `status_changed` event; status dominates content
    /// changes within the same poll.
    pub fn detect(
        &self,
        previous: &[CourtSessionRecord],
        next: &[CourtSessionRecord],
        timestamp: DateTime<Utc>,
    ) -> Vec<ChangeEvent> {
        let prev_map: HashMap<&str, &CourtSessionRecord> =
            previous.iter().map(|r| (r.court_number.as_str(), r)).collect();
        let next_map: HashMap<&str, &CourtSessionRecord> =
            next.iter().map(|r| (r.court_number.as_str(), r)).collect();

        let mut events = Vec::new();

        for record in next {
            let court = record.court_number.as_str();
            match prev_map.get(court) {
                None => events.push(make_event(
                    timestamp,
                    ChangeType::Added,
                    None,
                    Some(record),
                )),
                Some(prev) => {
                    if prev.is_in_session != record.is_in_session {
                        events.push(make_event(
                            timestamp,
                            ChangeType::StatusChanged,
                            Some(prev),
                            Some(record),
                        ));
                    } else if record.is_in_session && in_session_fields_differ(prev, record) {
                        events.push(make_event(
                            timestamp,
                            ChangeType::Updated,
                            Some(prev),
                            Some(record),
                        ));
                    }
                }
            }
        }

        for record in previous {
            if !next_map.contains_key(record.court_number.as_str()) {
                events.push(make_event(
                    timestamp,
                    ChangeType::Removed,
                    Some(record),
                    None,
                ));
            }
        }

        events
    }
}

/// Structural comparison of the in-session content fields.
fn in_session_fields_differ(a: &CourtSessionRecord, b: &CourtSessionRecord) -> bool {
    a.serial_number != b.serial_number
        || a.list_label != b.list_label
        || a.progress_label != b.progress_label
        || a.case_details != b.case_details
}

fn make_event(
    timestamp: DateTime<Utc>,
    change_type: ChangeType,
    previous: Option<&CourtSessionRecord>,
    current: Option<&CourtSessionRecord>,
) -> ChangeEvent {
    let court_number = current
        .or(previous)
        .map(|r| r.court_number.clone())
        .unwrap_or_default();

    let description = match change_type {
        ChangeType::Added => format!("Court {court_number} appeared in the schedule"),
        ChangeType::Removed => format!("Court {court_number} left the schedule"),
        ChangeType::StatusChanged => {
            let now_sitting = current.map(|r| r.is_in_session).unwrap_or(false);
            if now_sitting {
                format!("Court {court_number} is now in session")
            } else {
                format!("Court {court_number} is no longer in session")
            }
        }
        ChangeType::Updated => format!("Court {court_number} schedule updated"),
    };

    ChangeEvent {
        timestamp,
        court_number,
        change_type,
        previous: previous.cloned(),
        current: current.cloned(),
        description,
    }
}
