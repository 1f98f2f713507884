//! Court session record structures.

use serde::{Deserialize, Serialize};

/// Case information parsed from the case-details cell of a schedule row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseDetails {
    /// Case number, e.g. "WRIT/123/2024"
    pub case_number: String,

    /// Case title (whitespace-collapsed)
    pub title: String,

    /// Petitioner counsel names, in listing order
    pub petitioner_counsels: Vec<String>,

    /// Respondent counsel names, in listing order
    pub respondent_counsels: Vec<String>,
}

/// One row of the cause list for one court number at one poll.
///
/// Optional fields are `None` when the source did not print them; an empty
/// string is never used to stand in for an absent field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CourtSessionRecord {
    /// Court number (natural key within a snapshot)
    pub court_number: String,

    /// Whether the court is currently in session
    pub is_in_session: bool,

    /// Serial number of the item being heard (in-session only)
    pub serial_number: Option<String>,

    /// List label, e.g. "Daily List" (in-session only)
    pub list_label: Option<String>,

    /// Progress label, e.g. "Part Heard" (in-session only)
    pub progress_label: Option<String>,

    /// Parsed case block; `Some` only when the court is in session and at
    /// least a case number or a title could be extracted
    pub case_details: Option<CaseDetails>,
}

impl CourtSessionRecord {
    /// A record for a court that is not sitting.
    pub fn not_in_session(court_number: impl Into<String>) -> Self {
        Self {
            court_number: court_number.into(),
            is_in_session: false,
            serial_number: None,
            list_label: None,
            progress_label: None,
            case_details: None,
        }
    }

    /// Case number of the record, if a case block was parsed.
    pub fn case_number(&self) -> Option<&str> {
        self.case_details.as_ref().map(|c| c.case_number.as_str())
    }
}
