//! Request-scoped operator credentials.
//!
//! A `CredentialContext` is built from caller-supplied values for one request,
//! handed to every directory invocation of that request, and dropped when the
//! request ends. It is never serialized and its `Debug` output is redacted.

use std::fmt;

use crate::error::OpsError;

#[derive(Clone)]
pub struct CredentialContext {
    server: String,
    identity: String,
    secret: String,
}

impl CredentialContext {
    pub fn new(
        server: impl Into<String>,
        identity: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into().trim().to_string(),
            identity: identity.into().trim().to_string(),
            secret: secret.into(),
        }
    }

    /// Reject the request if the server address, operator identity or secret is empty.
    pub fn validate(&self) -> Result<(), OpsError> {
        let mut missing = Vec::new();
        if self.server.is_empty() {
            missing.push("server");
        }
        if self.identity.is_empty() {
            missing.push("identity");
        }
        if self.secret.is_empty() {
            missing.push("secret");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(OpsError::MissingCredentials { missing })
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialContext")
            .field("server", &"***")
            .field("identity", &"***")
            .field("secret", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_complete() {
        let creds = CredentialContext::new("10.0.0.5", "CORP\\ops", "hunter2");
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_missing_field() {
        let creds = CredentialContext::new("  ", "", "");
        assert_eq!(
            creds.validate(),
            Err(OpsError::MissingCredentials {
                missing: vec!["server", "identity", "secret"]
            })
        );
    }

    #[test]
    fn test_secret_is_not_trimmed() {
        let creds = CredentialContext::new("dc01", "ops", " spaced ");
        assert_eq!(creds.secret(), " spaced ");
    }

    #[test]
    fn test_debug_redacts_every_field() {
        let creds = CredentialContext::new("dc01", "CORP\\ops", "hunter2");
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("dc01"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("CORP"));
    }
}
