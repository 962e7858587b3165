use thiserror::Error;

/// Rejections raised before any directory invocation is attempted.
///
/// Per-term lookup failures and per-target mutation failures are not errors
/// at this level; they are reported inside the successful result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OpsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required credentials: {}", missing.join(", "))]
    MissingCredentials { missing: Vec<&'static str> },
}

impl OpsError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        OpsError::InvalidInput(message.into())
    }
}
