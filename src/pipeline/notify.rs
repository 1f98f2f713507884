//! Notification payload composition.

use chrono::Utc;

use crate::models::{ChangeEvent, ChangeType, NotificationRecord};

/// Composer turning accepted change events into notification payloads.
///
/// Pure rendering; performs no I/O and cannot fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationComposer;

impl NotificationComposer {
    pub fn new() -> Self {
        Self
    }

    /// Render a notification for an event that survived deduplication.
    pub fn compose(&self, event: &ChangeEvent) -> NotificationRecord {
        NotificationRecord {
            id: NotificationRecord::id_for(event),
            court_number: event.court_number.clone(),
            change_type: event.change_type,
            event_timestamp: event.timestamp,
            title: self.title(event),
            message: self.message(event),
            read: false,
            created_at: Utc::now(),
        }
    }

    fn title(&self, event: &ChangeEvent) -> String {
        let court = &event.court_number;
        match event.change_type {
            ChangeType::Added => format!("Court {court} listed"),
            ChangeType::Removed => format!("Court {court} delisted"),
            ChangeType::StatusChanged => format!("Court {court} session status changed"),
            ChangeType::Updated => format!("Court {court} listing updated"),
        }
    }

    fn message(&self, event: &ChangeEvent) -> String {
        let mut message = event.description.clone();

        let record = event.current.as_ref().or(event.previous.as_ref());
        if let Some(record) = record {
            if let Some(details) = &record.case_details {
                if !details.case_number.is_empty() {
                    message.push_str(&format!(", case {}", details.case_number));
                }
                if !details.title.is_empty() {
                    message.push_str(&format!(" ({})", details.title));
                }
            }
            if let Some(progress) = &record.progress_label {
                message.push_str(&format!(" [{progress}]"));
            }
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseDetails, CourtSessionRecord};

    fn status_event() -> ChangeEvent {
        ChangeEvent {
            timestamp: Utc::now(),
            court_number: "5".into(),
            change_type: ChangeType::StatusChanged,
            previous: Some(CourtSessionRecord::not_in_session("5")),
            current: Some(CourtSessionRecord {
                court_number: "5".into(),
                is_in_session: true,
                serial_number: Some("12".into()),
                list_label: Some("Daily List".into()),
                progress_label: Some("Hearing".into()),
                case_details: Some(CaseDetails {
                    case_number: "WRIT/123/2024".into(),
                    title: "Ram Kumar vs State".into(),
                    petitioner_counsels: vec![],
                    respondent_counsels: vec![],
                }),
            }),
            description: "Court 5 is now in session".into(),
        }
    }

    #[test]
    fn test_compose_interpolates_case_fields() {
        let record = NotificationComposer::new().compose(&status_event());
        assert_eq!(record.court_number, "5");
        assert_eq!(record.change_type, ChangeType::StatusChanged);
        assert!(record.title.contains("Court 5"));
        assert!(record.message.contains("WRIT/123/2024"));
        assert!(record.message.contains("Ram Kumar vs State"));
        assert!(record.message.contains("Hearing"));
        assert!(!record.read);
    }

    #[test]
    fn test_compose_without_case_block() {
        let mut event = status_event();
        event.current = Some(CourtSessionRecord::not_in_session("5"));
        event.description = "Court 5 is no longer in session".into();

        let record = NotificationComposer::new().compose(&event);
        assert_eq!(record.message, "Court 5 is no longer in session");
    }

    #[test]
    fn test_id_matches_event_derivation() {
        let event = status_event();
        let record = NotificationComposer::new().compose(&event);
        assert_eq!(record.id, NotificationRecord::id_for(&event));
        assert_eq!(record.event_timestamp, event.timestamp);
    }
}
