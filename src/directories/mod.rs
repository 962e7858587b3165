//! Directory capability implementations
//!
//! The orchestrator talks to the directory only through the `Directory` trait:
//! - PowerShell ActiveDirectory module, run as a child process per invocation
//! - REST directory gateway over HTTP

mod directory;
#[cfg(test)]
pub(crate) mod fake;
mod http;
mod powershell;

pub use directory::{
    ActionParams, Directory, LookupFilter, LookupRequest, MutationAction, MutationRequest,
    ACCOUNT_ATTRIBUTES,
};
pub use http::HttpDirectory;
pub use powershell::PowerShellDirectory;

/// Directory type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryType {
    PowerShell,
    Http,
}

impl std::str::FromStr for DirectoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "powershell" | "pwsh" => Ok(DirectoryType::PowerShell),
            "http" | "rest" => Ok(DirectoryType::Http),
            _ => Err(format!(
                "Unknown directory type: {}. Supported: powershell, http",
                s
            )),
        }
    }
}

/// Type alias for directory trait object
pub type DirectoryInstance = std::sync::Arc<dyn Directory>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_type_from_str() {
        assert_eq!("PowerShell".parse::<DirectoryType>(), Ok(DirectoryType::PowerShell));
        assert_eq!("rest".parse::<DirectoryType>(), Ok(DirectoryType::Http));
        assert!("ldap".parse::<DirectoryType>().is_err());
    }
}
