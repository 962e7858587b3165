use std::collections::HashSet;

use crate::lookup::TermLookup;
use crate::model::{DirectoryAccount, LookupFailure, SearchResponse, SearchTerm};

/// Per-term lookups folded into one account list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedResults {
    pub accounts: Vec<DirectoryAccount>,
    pub failures: Vec<LookupFailure>,
    pub unmatched: Vec<SearchTerm>,
}

/// Deduplicate accounts by SAM name (first occurrence wins) and collect
/// failures and empty matches in term order.
pub fn merge_lookups(lookups: Vec<TermLookup>) -> MergedResults {
    let mut seen = HashSet::new();
    let mut merged = MergedResults::default();

    for lookup in lookups {
        match lookup.outcome {
            Ok(accounts) if accounts.is_empty() => merged.unmatched.push(lookup.term),
            Ok(accounts) => {
                for account in accounts {
                    if seen.insert(account.account_key()) {
                        merged.accounts.push(account);
                    }
                }
            }
            Err(error) => merged.failures.push(LookupFailure {
                term: lookup.term,
                error,
            }),
        }
    }

    merged
}

impl From<MergedResults> for SearchResponse {
    fn from(merged: MergedResults) -> Self {
        let errors: Vec<String> = merged.failures.iter().map(ToString::to_string).collect();
        Self {
            success: errors.is_empty(),
            total_accounts: merged.accounts.len(),
            accounts: merged.accounts,
            errors,
            unmatched_terms: merged.unmatched,
        }
    }
}
