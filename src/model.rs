use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// One normalized search entry: trimmed, non-empty, case preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SearchTerm(String);

impl SearchTerm {
    /// Returns `None` for entries that are empty after trimming.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directory user record as returned by a lookup.
///
/// Field names on the wire follow the directory's own attribute names so that
/// records from the directory command deserialize without a mapping layer.
/// Attributes beyond the fixed set land in `custom_fields` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryAccount {
    #[serde(rename = "Name", default)]
    pub display_name: String,

    #[serde(rename = "SamAccountName")]
    pub sam_account_name: String,

    #[serde(rename = "UserPrincipalName", default)]
    pub user_principal_name: Option<String>,

    #[serde(rename = "DistinguishedName", default)]
    pub distinguished_name: Option<String>,

    #[serde(rename = "Enabled", default, deserialize_with = "null_as_false")]
    pub enabled: bool,

    #[serde(rename = "LockedOut", default, deserialize_with = "null_as_false")]
    pub locked: bool,

    #[serde(flatten)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
}

/// The directory reports unset flags as null.
fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl DirectoryAccount {
    /// Merge key: SAM names are case-insensitive in the directory.
    pub fn account_key(&self) -> String {
        self.sam_account_name.to_lowercase()
    }
}

/// A single-term lookup that raised an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupFailure {
    pub term: SearchTerm,
    pub error: String,
}

impl fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error searching '{}': {}", self.term, self.error)
    }
}

/// Result of one mutation against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    target: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl MutationOutcome {
    pub fn succeeded(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(target: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Aggregated outcome of a batch mutation, in input order.
///
/// Counts are derived from the outcome list on every read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkOperationReport {
    outcomes: Vec<MutationOutcome>,
}

impl BulkOperationReport {
    pub fn from_outcomes(outcomes: Vec<MutationOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn outcomes(&self) -> &[MutationOutcome] {
        &self.outcomes
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed() == 0
    }
}

impl Serialize for BulkOperationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("BulkOperationReport", 5)?;
        state.serialize_field("success", &self.is_complete_success())?;
        state.serialize_field("total", &self.total())?;
        state.serialize_field("succeeded", &self.succeeded())?;
        state.serialize_field("failed", &self.failed())?;
        state.serialize_field("results", &self.outcomes)?;
        state.end()
    }
}

/// What `search` hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub total_accounts: usize,
    pub accounts: Vec<DirectoryAccount>,
    pub errors: Vec<String>,
    pub unmatched_terms: Vec<SearchTerm>,
}
