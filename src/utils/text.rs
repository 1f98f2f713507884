//! Text cleanup helpers for parsed cell content.

/// Collapse all runs of whitespace (including newlines) to single spaces
/// and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a comma-separated name list, trimming entries and dropping empty
/// tokens.
pub fn split_name_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|part| collapse_whitespace(part))
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  c "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_split_name_list_drops_empty_tokens() {
        assert_eq!(
            split_name_list("A. Kumar, , B. Singh ,"),
            vec!["A. Kumar".to_string(), "B. Singh".to_string()]
        );
        assert!(split_name_list(" , ,").is_empty());
    }

    #[test]
    fn test_split_name_list_collapses_inner_whitespace() {
        assert_eq!(
            split_name_list("C.\nD. Sharma"),
            vec!["C. D. Sharma".to_string()]
        );
    }
}
