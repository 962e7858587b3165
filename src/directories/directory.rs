use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::credentials::CredentialContext;
use crate::model::{DirectoryAccount, SearchTerm};

/// Attributes requested on every lookup, in addition to configured custom fields.
pub const ACCOUNT_ATTRIBUTES: &[&str] = &[
    "Name",
    "SamAccountName",
    "UserPrincipalName",
    "DistinguishedName",
    "Enabled",
    "LockedOut",
];

/// Wildcard match on a single directory attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupFilter {
    pub attribute: String,
    pub pattern: String,
}

impl LookupFilter {
    /// `*term*` against the display name.
    pub fn display_name_contains(term: &SearchTerm) -> Self {
        Self {
            attribute: "Name".to_string(),
            pattern: format!("*{}*", term.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LookupRequest {
    pub filter: LookupFilter,
    pub attributes: Vec<String>,
    pub credentials: CredentialContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationAction {
    Disable,
    ResetPassword,
    Unlock,
}

impl MutationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationAction::Disable => "disable",
            MutationAction::ResetPassword => "reset-password",
            MutationAction::Unlock => "unlock",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MutationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(MutationAction::Disable),
            "reset-password" | "reset_password" => Ok(MutationAction::ResetPassword),
            "unlock" => Ok(MutationAction::Unlock),
            _ => Err(format!(
                "Unknown action: {}. Supported: disable, reset-password, unlock",
                s
            )),
        }
    }
}

/// Action kind together with its action-specific parameters.
#[derive(Clone, PartialEq, Eq)]
pub enum ActionParams {
    Disable {
        reference: String,
    },
    ResetPassword {
        new_password: String,
        temporary: bool,
        reference: String,
    },
    Unlock {
        reference: String,
    },
}

impl ActionParams {
    pub fn action(&self) -> MutationAction {
        match self {
            ActionParams::Disable { .. } => MutationAction::Disable,
            ActionParams::ResetPassword { .. } => MutationAction::ResetPassword,
            ActionParams::Unlock { .. } => MutationAction::Unlock,
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            ActionParams::Disable { reference }
            | ActionParams::ResetPassword { reference, .. }
            | ActionParams::Unlock { reference } => reference.as_str(),
        }
    }
}

impl fmt::Debug for ActionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionParams::Disable { reference } => f
                .debug_struct("Disable")
                .field("reference", reference)
                .finish(),
            ActionParams::ResetPassword {
                temporary,
                reference,
                ..
            } => f
                .debug_struct("ResetPassword")
                .field("new_password", &"***")
                .field("temporary", temporary)
                .field("reference", reference)
                .finish(),
            ActionParams::Unlock { reference } => f
                .debug_struct("Unlock")
                .field("reference", reference)
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MutationRequest {
    pub target: String,
    pub params: ActionParams,
    pub credentials: CredentialContext,
}

/// Capability boundary to the external directory (PowerShell module, REST gateway, ...)
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    /// Find accounts matching the filter on the request's server
    async fn lookup(&self, request: &LookupRequest) -> Result<Vec<DirectoryAccount>>;

    /// Apply one mutating action to one account
    async fn mutate(&self, request: &MutationRequest) -> Result<()>;

    /// Get the directory type name for display purposes
    fn directory_type(&self) -> &'static str;
}
