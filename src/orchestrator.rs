//! Caller-facing account operations.
//!
//! `AccountOperations` holds only process-wide collaborators (the directory,
//! an optional audit sink, fan-out bounds). Credentials arrive with each call
//! and are handed down to the workers of that call alone.

use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditSink};
use crate::config::OrchestratorConfig;
use crate::credentials::CredentialContext;
use crate::directories::{Directory, MutationAction};
use crate::error::OpsError;
use crate::lookup;
use crate::merge;
use crate::model::{BulkOperationReport, MutationOutcome, SearchResponse};
use crate::mutation;
use crate::query;

pub struct AccountOperations {
    directory: Arc<dyn Directory>,
    audit: Option<Arc<dyn AuditSink>>,
    settings: OrchestratorConfig,
    custom_attributes: Vec<String>,
}

impl AccountOperations {
    pub fn new(directory: Arc<dyn Directory>, settings: OrchestratorConfig) -> Self {
        Self {
            directory,
            audit: None,
            settings,
            custom_attributes: Vec::new(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_custom_attributes(mut self, custom_attributes: Vec<String>) -> Self {
        self.custom_attributes = custom_attributes;
        self
    }

    /// Search the directory for every term in a multi-line request.
    pub async fn search(
        &self,
        raw_input: &str,
        credentials: &CredentialContext,
    ) -> Result<SearchResponse, OpsError> {
        let terms = query::normalize_search_input(raw_input)?;
        credentials.validate()?;

        let lookups = lookup::lookup_all(
            Arc::clone(&self.directory),
            terms,
            &self.custom_attributes,
            credentials,
            &self.settings,
        )
        .await;

        let response: SearchResponse = merge::merge_lookups(lookups).into();
        info!(
            "Search returned {} account(s), {} failed term(s), {} unmatched term(s)",
            response.total_accounts,
            response.errors.len(),
            response.unmatched_terms.len()
        );
        Ok(response)
    }

    /// Disable every target; one failing account never aborts the rest.
    pub async fn bulk_disable(
        &self,
        targets: &[String],
        reference: &str,
        credentials: &CredentialContext,
    ) -> Result<BulkOperationReport, OpsError> {
        let report = mutation::bulk_disable(
            Arc::clone(&self.directory),
            targets,
            reference,
            credentials,
            &self.settings,
        )
        .await?;

        for outcome in report.outcomes().iter().filter(|o| o.is_success()) {
            self.record(AuditEntry::new(
                MutationAction::Disable,
                outcome.target(),
                reference.trim(),
            ))
            .await;
        }

        Ok(report)
    }

    pub async fn reset_password(
        &self,
        target: &str,
        new_password: &str,
        temporary: bool,
        reference: &str,
        credentials: &CredentialContext,
    ) -> Result<MutationOutcome, OpsError> {
        let outcome = mutation::reset_password(
            self.directory.as_ref(),
            target,
            new_password,
            temporary,
            reference,
            credentials,
            &self.settings,
        )
        .await?;

        if outcome.is_success() {
            let details = json!({
                "password_type": if temporary { "temporary" } else { "permanent" },
                "change_at_logon": temporary,
            });
            self.record(
                AuditEntry::new(MutationAction::ResetPassword, outcome.target(), reference.trim())
                    .with_details(details),
            )
            .await;
        }

        Ok(outcome)
    }

    pub async fn unlock(
        &self,
        target: &str,
        reference: &str,
        credentials: &CredentialContext,
    ) -> Result<MutationOutcome, OpsError> {
        let outcome = mutation::unlock(
            self.directory.as_ref(),
            target,
            reference,
            credentials,
            &self.settings,
        )
        .await?;

        if outcome.is_success() {
            self.record(AuditEntry::new(
                MutationAction::Unlock,
                outcome.target(),
                reference.trim(),
            ))
            .await;
        }

        Ok(outcome)
    }

    async fn record(&self, entry: AuditEntry) {
        let Some(ref audit) = self.audit else {
            return;
        };

        if let Err(e) = audit.record(&entry).await {
            warn!(
                "Failed to record {} for {} in {} audit log: {:#}",
                entry.action_label(),
                entry.target,
                audit.sink_type(),
                e
            );
        }
    }
}
