// src/pipeline/parser.rs

//! Cause-list HTML parser.
//!
//! Turns the semi-structured schedule page into typed records. The parser is
//! a total function: malformed or empty markup yields an empty record list,
//! never an error, because an empty page is a legitimate poll outcome (the
//! site drops rows while a sitting is off).

use regex::Regex;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{CaseDetails, CourtSessionRecord, LabelConfig};
use crate::utils::{collapse_whitespace, split_name_list};

/// Compiled label vocabulary.
///
/// Extraction is anchored on a fixed set of label strings; the patterns are
/// configuration (see [`LabelConfig`]) so the vocabulary can be versioned
/// without touching callers.
#[derive(Debug, Clone)]
pub struct LabelPatterns {
    marker: String,
    case_number: Regex,
    title_label: Regex,
    petitioner_label: Regex,
    respondent_label: Regex,
}

impl LabelPatterns {
    /// Compile the configured patterns.
    pub fn compile(config: &LabelConfig) -> Result<Self> {
        let build = |name: &str, pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| AppError::config(format!("{name} is not a valid regex: {e}")))
        };
        Ok(Self {
            marker: config.not_in_session_marker.clone(),
            case_number: build("labels.case_number_pattern", &config.case_number_pattern)?,
            title_label: build("labels.title_label_pattern", &config.title_label_pattern)?,
            petitioner_label: build(
                "labels.petitioner_label_pattern",
                &config.petitioner_label_pattern,
            )?,
            respondent_label: build(
                "labels.respondent_label_pattern",
                &config.respondent_label_pattern,
            )?,
        })
    }
}

/// Parser for the cause-list schedule table.
pub struct ScheduleParser {
    patterns: LabelPatterns,
    table_selector: Selector,
    row_selector: Selector,
    header_selector: Selector,
    cell_selector: Selector,
}

impl ScheduleParser {
    /// Create a parser from the configured label vocabulary.
    pub fn new(labels: &LabelConfig) -> Result<Self> {
        Ok(Self {
            patterns: LabelPatterns::compile(labels)?,
            table_selector: Self::parse_selector("table")?,
            row_selector: Self::parse_selector("tr")?,
            header_selector: Self::parse_selector("th")?,
            cell_selector: Self::parse_selector("td")?,
        })
    }

    /// Parse the schedule page into records.
    ///
    /// Total: any input without a recognizable schedule table produces an
    /// empty list.
    pub fn parse(&self, html: &str) -> Vec<CourtSessionRecord> {
        let document = Html::parse_document(html);

        let Some(table) = document.select(&self.table_selector).next() else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for row in table.select(&self.row_selector) {
            // Header rows carry <th> cells
            if row.select(&self.header_selector).next().is_some() {
                continue;
            }

            let cells: Vec<String> = row
                .select(&self.cell_selector)
                .map(|cell| cell.text().collect::<String>())
                .collect();
            if cells.is_empty() {
                continue;
            }

            let court_number = collapse_whitespace(&cells[0]);
            if court_number.is_empty() {
                continue;
            }

            // The marker string is the only session-status signal in the
            // markup and appears in the serial cell or the case-details cell
            // only (a spanned row collapses it into the second cell); other
            // cells are not scanned.
            let marker_cells = [cells.get(1), cells.get(4)];
            if marker_cells
                .into_iter()
                .flatten()
                .any(|c| c.contains(&self.patterns.marker))
            {
                records.push(CourtSessionRecord::not_in_session(court_number));
                continue;
            }

            if cells.len() < 5 {
                continue;
            }

            let serial_number = non_empty(&cells[1]);
            let list_label = non_empty(&cells[2]);
            let progress_label = non_empty(&cells[3]);
            let case_details = self.parse_case_blob(&cells[4]);

            records.push(CourtSessionRecord {
                court_number,
                is_in_session: true,
                serial_number,
                list_label,
                progress_label,
                case_details,
            });
        }
        records
    }

    /// Parse the free-text case-details blob.
    ///
    /// Sub-extractions run in a fixed order: case number, title, petitioner
    /// counsels, respondent counsels. Returns `None` unless at least a case
    /// number or a title was found.
    fn parse_case_blob(&self, raw: &str) -> Option<CaseDetails> {
        let text = collapse_whitespace(raw);
        if text.is_empty() {
            return None;
        }

        let case_number = self
            .patterns
            .case_number
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        let petitioner_at = self.patterns.petitioner_label.find(&text);
        let respondent_at = self.patterns.respondent_label.find(&text);

        let title = self.patterns.title_label.find(&text).map(|label| {
            let start = label.end();
            // Title runs to the next recognized label, or to end of text.
            let end = [petitioner_at.as_ref(), respondent_at.as_ref()]
                .into_iter()
                .flatten()
                .map(|m| m.start())
                .filter(|&pos| pos >= start)
                .min()
                .unwrap_or(text.len());
            collapse_whitespace(&text[start..end])
        });

        let petitioner_counsels = petitioner_at
            .as_ref()
            .map(|label| {
                let start = label.end();
                let end = respondent_at
                    .as_ref()
                    .map(|m| m.start())
                    .filter(|&pos| pos >= start)
                    .unwrap_or(text.len());
                split_name_list(&text[start..end])
            })
            .unwrap_or_default();

        let respondent_counsels = respondent_at
            .as_ref()
            .map(|label| split_name_list(&text[label.end()..]))
            .unwrap_or_default();

        let has_case_number = case_number.is_some();
        let has_title = title.as_ref().is_some_and(|t| !t.is_empty());
        if !has_case_number && !has_title {
            return None;
        }

        Some(CaseDetails {
            case_number: case_number.unwrap_or_default(),
            title: title.unwrap_or_default(),
            petitioner_counsels,
            respondent_counsels,
        })
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LabelConfig;

    fn parser() -> ScheduleParser {
        ScheduleParser::new(&LabelConfig::default()).unwrap()
    }

    const SCHEDULE_HTML: &str = r#"
        <html><body>
        <table>
          <tr><th>Court No.</th><th>Serial</th><th>List</th><th>Progress</th><th>Case Details</th></tr>
          <tr>
            <td>5</td><td>12</td><td>Daily List</td><td>Hearing</td>
            <td>Case Details - WRIT/123/2024
                Title: Ram Kumar
                vs State
                Petitioner's Counsel(s): A. Verma, B. Singh,
                Respondent's Counsel(s): C.S.C.</td>
          </tr>
          <tr><td>7</td><td colspan="4">Court is NOT IN SESSION</td></tr>
          <tr>
            <td>9</td><td></td><td></td><td></td>
            <td>listing awaited</td>
          </tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parse_full_schedule() {
        let records = parser().parse(SCHEDULE_HTML);
        assert_eq!(records.len(), 3);

        let court5 = &records[0];
        assert_eq!(court5.court_number, "5");
        assert!(court5.is_in_session);
        assert_eq!(court5.serial_number.as_deref(), Some("12"));
        assert_eq!(court5.list_label.as_deref(), Some("Daily List"));
        assert_eq!(court5.progress_label.as_deref(), Some("Hearing"));

        let details = court5.case_details.as_ref().unwrap();
        assert_eq!(details.case_number, "WRIT/123/2024");
        assert_eq!(details.title, "Ram Kumar vs State");
        assert_eq!(details.petitioner_counsels, vec!["A. Verma", "B. Singh"]);
        assert_eq!(details.respondent_counsels, vec!["C.S.C."]);
    }

    #[test]
    fn test_marker_row_is_not_in_session() {
        let records = parser().parse(SCHEDULE_HTML);
        let court7 = &records[1];
        assert_eq!(court7.court_number, "7");
        assert!(!court7.is_in_session);
        assert!(court7.case_details.is_none());
        assert!(court7.serial_number.is_none());
    }

    #[test]
    fn test_in_session_without_parseable_case() {
        let records = parser().parse(SCHEDULE_HTML);
        let court9 = &records[2];
        assert!(court9.is_in_session);
        assert!(court9.case_details.is_none());
    }

    #[test]
    fn test_empty_fields_are_none_not_empty_string() {
        let records = parser().parse(SCHEDULE_HTML);
        let court9 = &records[2];
        assert!(court9.serial_number.is_none());
        assert!(court9.list_label.is_none());
        assert!(court9.progress_label.is_none());
    }

    #[test]
    fn test_no_table_yields_empty() {
        assert!(parser().parse("<html><body><p>down</p></body></html>").is_empty());
        assert!(parser().parse("").is_empty());
        assert!(parser().parse("<<<< not html").is_empty());
    }

    #[test]
    fn test_marker_casing_must_match() {
        // Reworded/lowercased markers are not recognized; the row still has
        // too few cells for a data row, so it is skipped entirely.
        let html = r#"<table>
            <tr><td>3</td><td colspan="4">court is not in session</td></tr>
        </table>"#;
        let records = parser().parse(html);
        assert!(records.is_empty());
    }

    #[test]
    fn test_marker_outside_status_cells_does_not_misclassify() {
        // The marker text appearing in the list cell is incidental; the
        // serial and case-details cells decide the session status.
        let html = r#"<table><tr>
            <td>6</td><td>2</td><td>Supplementary (NOT IN SESSION carryover)</td><td>Hearing</td>
            <td>Case Details - WRIT/9/2024 Title: A vs B</td>
        </tr></table>"#;
        let records = parser().parse(html);
        assert_eq!(records.len(), 1);
        assert!(records[0].is_in_session);
        assert_eq!(
            records[0].case_details.as_ref().unwrap().case_number,
            "WRIT/9/2024"
        );
    }

    #[test]
    fn test_blob_with_only_title() {
        let html = r#"<table><tr>
            <td>2</td><td>1</td><td>L</td><td>P</td>
            <td>Title: Fresh matter awaiting number</td>
        </tr></table>"#;
        let records = parser().parse(html);
        let details = records[0].case_details.as_ref().unwrap();
        assert_eq!(details.case_number, "");
        assert_eq!(details.title, "Fresh matter awaiting number");
        assert!(details.petitioner_counsels.is_empty());
    }

    #[test]
    fn test_short_row_without_marker_is_skipped() {
        let html = "<table><tr><td>4</td><td>stray</td></tr></table>";
        assert!(parser().parse(html).is_empty());
    }
}
