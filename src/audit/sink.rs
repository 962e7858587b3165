use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::directories::MutationAction;

/// One successful mutation, as recorded for later review.
///
/// Holds no credential material and never a password.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub action: MutationAction,
    pub target: String,
    pub reference: String,
    pub details: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: MutationAction, target: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
            reference: reference.into(),
            details: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Storage label, e.g. `DISABLE_ACCOUNT`
    pub fn action_label(&self) -> &'static str {
        match self.action {
            MutationAction::Disable => "DISABLE_ACCOUNT",
            MutationAction::ResetPassword => "RESET_PASSWORD",
            MutationAction::Unlock => "UNLOCK_ACCOUNT",
        }
    }
}

/// A row read back from the action log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub action_type: String,
    pub sam_account_name: String,
    pub reference: String,
    pub additional_details: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Build a record from stored column values. Details that are not valid
    /// JSON are kept as a plain string.
    pub fn from_columns(
        id: i64,
        action_type: String,
        sam_account_name: String,
        reference: String,
        additional_details: Option<String>,
        recorded_at: &str,
    ) -> Result<Self> {
        let recorded_at = DateTime::parse_from_rfc3339(recorded_at)
            .with_context(|| format!("Invalid timestamp in action log: {}", recorded_at))?
            .with_timezone(&Utc);

        let additional_details = additional_details.map(|raw| {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        });

        Ok(Self {
            id,
            action_type,
            sam_account_name,
            reference,
            additional_details,
            recorded_at,
        })
    }
}

/// Trait for audit destinations (databases, files, etc.)
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one entry
    async fn record(&self, entry: &AuditEntry) -> Result<()>;

    /// Get the sink type name for display purposes
    fn sink_type(&self) -> &'static str;
}
