use std::collections::HashSet;

use crate::error::OpsError;
use crate::model::SearchTerm;

/// Split a raw search request into an ordered, deduplicated list of terms.
///
/// Entries are separated by line breaks or commas. Duplicates are compared
/// case-insensitively and the first spelling seen is kept.
pub fn normalize_search_input(raw: &str) -> Result<Vec<SearchTerm>, OpsError> {
    let mut seen = HashSet::new();
    let terms: Vec<SearchTerm> = raw
        .split(|c| matches!(c, '\n' | '\r' | ','))
        .filter_map(SearchTerm::new)
        .filter(|term| seen.insert(term.as_str().to_lowercase()))
        .collect();

    if terms.is_empty() {
        return Err(OpsError::invalid_input("No search input provided"));
    }

    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(terms: &[SearchTerm]) -> Vec<&str> {
        terms.iter().map(SearchTerm::as_str).collect()
    }

    #[test]
    fn test_lines_and_commas() {
        let terms = normalize_search_input("Cadis, Neil\nModesto\r\nSmith").unwrap();
        assert_eq!(strings(&terms), vec!["Cadis", "Neil", "Modesto", "Smith"]);
    }

    #[test]
    fn test_case_insensitive_dedup_keeps_first_spelling() {
        let terms = normalize_search_input("jones\nSmith\nJONES\nsmith\n").unwrap();
        assert_eq!(strings(&terms), vec!["jones", "Smith"]);
    }

    #[test]
    fn test_blank_entries_dropped() {
        let terms = normalize_search_input("\n  \n,, doe ,\n\t\n").unwrap();
        assert_eq!(strings(&terms), vec!["doe"]);
    }

    #[test]
    fn test_empty_input_is_invalid() {
        assert!(matches!(
            normalize_search_input(" \n , \r\n"),
            Err(OpsError::InvalidInput(_))
        ));
        assert!(normalize_search_input("").is_err());
    }

    #[test]
    fn test_distinct_count_matches_term_count() {
        let raw = "a\nb\nA\nc\nB\nd";
        let terms = normalize_search_input(raw).unwrap();
        assert_eq!(terms.len(), 4);
        assert_eq!(strings(&terms), vec!["a", "b", "c", "d"]);
    }
}
