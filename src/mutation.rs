//! Batch mutation coordinator.
//!
//! Every target is attempted independently and moves once from pending to
//! attempted to succeeded or failed. A failed target never stops the others
//! and nothing already applied is rolled back. Request-shape problems are
//! rejected before the directory is touched.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::credentials::CredentialContext;
use crate::directories::{ActionParams, Directory, MutationRequest};
use crate::error::OpsError;
use crate::model::{BulkOperationReport, MutationOutcome};
use crate::pool::{self, Slot};

/// Trim targets, drop blanks and collapse case-insensitive duplicates.
pub fn normalize_targets(targets: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    targets
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .map(String::from)
        .collect()
}

fn required(value: &str, field: &str) -> Result<String, OpsError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(OpsError::invalid_input(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Attempt one mutation; errors and timeouts become a failed outcome.
pub async fn execute_mutation(
    directory: &dyn Directory,
    request: MutationRequest,
    timeout: Duration,
) -> MutationOutcome {
    let action = request.params.action();
    debug!("Attempting {} for {}", action, request.target);

    match tokio::time::timeout(timeout, directory.mutate(&request)).await {
        Ok(Ok(())) => {
            info!("{} succeeded for {}", action, request.target);
            MutationOutcome::succeeded(request.target)
        }
        Ok(Err(e)) => {
            warn!("{} failed for {}: {:#}", action, request.target, e);
            MutationOutcome::failed(request.target, format!("{:#}", e))
        }
        Err(_) => {
            warn!("{} for {} timed out after {:?}", action, request.target, timeout);
            MutationOutcome::failed(
                request.target,
                format!("{} timed out after {} seconds", action, timeout.as_secs()),
            )
        }
    }
}

/// Disable every target under one ticket reference.
pub async fn bulk_disable(
    directory: Arc<dyn Directory>,
    targets: &[String],
    reference: &str,
    credentials: &CredentialContext,
    settings: &OrchestratorConfig,
) -> Result<BulkOperationReport, OpsError> {
    let targets = normalize_targets(targets);
    if targets.is_empty() {
        return Err(OpsError::invalid_input("No user accounts provided"));
    }
    let reference = required(reference, "Ticket number")?;
    credentials.validate()?;

    info!(
        "Disabling {} account(s) under {} via {}",
        targets.len(),
        reference,
        directory.directory_type()
    );

    let timeout = settings.invocation_timeout();
    let slots = pool::run_indexed(
        targets.clone(),
        settings.concurrency(),
        settings.batch_deadline(),
        |target| {
            let directory = Arc::clone(&directory);
            let request = MutationRequest {
                target,
                params: ActionParams::Disable {
                    reference: reference.clone(),
                },
                credentials: credentials.clone(),
            };
            async move { execute_mutation(directory.as_ref(), request, timeout).await }
        },
    )
    .await;

    let outcomes = targets
        .into_iter()
        .zip(slots)
        .map(|(target, slot)| match slot {
            Slot::Done(outcome) => outcome,
            Slot::Failed(e) => MutationOutcome::failed(target, format!("worker failed: {}", e)),
            Slot::Abandoned => MutationOutcome::failed(target, "abandoned: batch deadline elapsed"),
        })
        .collect();

    let report = BulkOperationReport::from_outcomes(outcomes);
    info!(
        "Bulk disable finished: {} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
    Ok(report)
}

/// Reset one account's password; `temporary` forces a change at next sign-in.
pub async fn reset_password(
    directory: &dyn Directory,
    target: &str,
    new_password: &str,
    temporary: bool,
    reference: &str,
    credentials: &CredentialContext,
    settings: &OrchestratorConfig,
) -> Result<MutationOutcome, OpsError> {
    let target = required(target, "Target account")?;
    if new_password.is_empty() {
        return Err(OpsError::invalid_input("New password is required"));
    }
    let reference = required(reference, "Reference")?;
    credentials.validate()?;

    let request = MutationRequest {
        target,
        params: ActionParams::ResetPassword {
            new_password: new_password.to_string(),
            temporary,
            reference,
        },
        credentials: credentials.clone(),
    };

    Ok(execute_mutation(directory, request, settings.invocation_timeout()).await)
}

/// Unlock one account.
pub async fn unlock(
    directory: &dyn Directory,
    target: &str,
    reference: &str,
    credentials: &CredentialContext,
    settings: &OrchestratorConfig,
) -> Result<MutationOutcome, OpsError> {
    let target = required(target, "Target account")?;
    let reference = required(reference, "Reference")?;
    credentials.validate()?;

    let request = MutationRequest {
        target,
        params: ActionParams::Unlock { reference },
        credentials: credentials.clone(),
    };

    Ok(execute_mutation(directory, request, settings.invocation_timeout()).await)
}
