//! Directory Account Operations Library
//!
//! Multi-term account search and bulk lifecycle actions (disable, password
//! reset, unlock) against an external directory, with per-item failure
//! isolation and partial-success reporting.

pub mod audit;
pub mod config;
pub mod credentials;
pub mod directories;
pub mod error;
pub mod lookup;
pub mod merge;
pub mod model;
pub mod mutation;
pub mod orchestrator;
pub mod password;
mod pool;
pub mod query;

pub use config::Config;
pub use credentials::CredentialContext;
pub use directories::{Directory, DirectoryInstance, MutationAction};
pub use error::OpsError;
pub use model::{
    BulkOperationReport, DirectoryAccount, LookupFailure, MutationOutcome, SearchResponse,
    SearchTerm,
};
pub use orchestrator::AccountOperations;
pub use password::generate_password;
pub use query::normalize_search_input;
