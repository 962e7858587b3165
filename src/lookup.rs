use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::credentials::CredentialContext;
use crate::directories::{Directory, LookupFilter, LookupRequest, ACCOUNT_ATTRIBUTES};
use crate::model::{DirectoryAccount, SearchTerm};
use crate::pool::{self, Slot};

/// Outcome of one term's lookup: records, or the rendered error chain.
#[derive(Debug, Clone, PartialEq)]
pub struct TermLookup {
    pub term: SearchTerm,
    pub outcome: Result<Vec<DirectoryAccount>, String>,
}

/// Fixed attribute set plus configured custom attributes, without duplicates.
pub fn lookup_attributes(custom_attributes: &[String]) -> Vec<String> {
    let mut attributes: Vec<String> = ACCOUNT_ATTRIBUTES.iter().map(|a| a.to_string()).collect();
    for custom in custom_attributes {
        let custom = custom.trim();
        if !custom.is_empty() && !attributes.iter().any(|a| a.eq_ignore_ascii_case(custom)) {
            attributes.push(custom.to_string());
        }
    }
    attributes
}

/// Look up a single term. Errors and timeouts become a failed `TermLookup`.
pub async fn lookup_term(
    directory: &dyn Directory,
    term: SearchTerm,
    attributes: Vec<String>,
    credentials: CredentialContext,
    timeout: Duration,
) -> TermLookup {
    let request = LookupRequest {
        filter: LookupFilter::display_name_contains(&term),
        attributes,
        credentials,
    };

    debug!("Searching {} for '{}'", directory.directory_type(), term);

    let outcome = match tokio::time::timeout(timeout, directory.lookup(&request)).await {
        Ok(Ok(accounts)) => {
            debug!("'{}' matched {} account(s)", term, accounts.len());
            Ok(accounts)
        }
        Ok(Err(e)) => {
            warn!("Lookup for '{}' failed: {:#}", term, e);
            Err(format!("{:#}", e))
        }
        Err(_) => {
            warn!("Lookup for '{}' timed out after {:?}", term, timeout);
            Err(format!("lookup timed out after {} seconds", timeout.as_secs()))
        }
    };

    TermLookup { term, outcome }
}

/// Look up every term through the bounded worker pool, in term order.
pub async fn lookup_all(
    directory: Arc<dyn Directory>,
    terms: Vec<SearchTerm>,
    custom_attributes: &[String],
    credentials: &CredentialContext,
    settings: &OrchestratorConfig,
) -> Vec<TermLookup> {
    info!(
        "Searching {} term(s) via {} (concurrency {})",
        terms.len(),
        directory.directory_type(),
        settings.concurrency()
    );

    let attributes = lookup_attributes(custom_attributes);
    let timeout = settings.invocation_timeout();

    let slots = pool::run_indexed(
        terms.clone(),
        settings.concurrency(),
        settings.batch_deadline(),
        |term| {
            let directory = Arc::clone(&directory);
            let attributes = attributes.clone();
            let credentials = credentials.clone();
            async move {
                lookup_term(directory.as_ref(), term, attributes, credentials, timeout).await
            }
        },
    )
    .await;

    terms
        .into_iter()
        .zip(slots)
        .map(|(term, slot)| match slot {
            Slot::Done(lookup) => lookup,
            Slot::Failed(e) => TermLookup {
                term,
                outcome: Err(format!("lookup worker failed: {}", e)),
            },
            Slot::Abandoned => TermLookup {
                term,
                outcome: Err("lookup abandoned: batch deadline elapsed".to_string()),
            },
        })
        .collect()
}
