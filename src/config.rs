use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory implementation to use (powershell or http)
    #[serde(default = "default_directory_kind")]
    pub kind: String,
    /// Extra attributes requested on every lookup and passed through untouched
    #[serde(default)]
    pub custom_attributes: Vec<String>,
    #[serde(default)]
    pub powershell: PowerShellConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpDirectoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerShellConfig {
    #[serde(default = "default_powershell_executable")]
    pub executable: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpDirectoryConfig {
    pub base_url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// Fan-out bounds for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_invocation_timeout")]
    pub invocation_timeout_seconds: u64,
    #[serde(default = "default_batch_deadline")]
    pub batch_deadline_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub postgres: PostgresAuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresAuditConfig {
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

fn default_directory_kind() -> String {
    "powershell".to_string()
}

fn default_powershell_executable() -> String {
    "powershell.exe".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

fn default_invocation_timeout() -> u64 {
    30
}

fn default_batch_deadline() -> u64 {
    120
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            kind: default_directory_kind(),
            custom_attributes: Vec::new(),
            powershell: PowerShellConfig::default(),
            http: None,
        }
    }
}

impl Default for PowerShellConfig {
    fn default() -> Self {
        Self {
            executable: default_powershell_executable(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            invocation_timeout_seconds: default_invocation_timeout(),
            batch_deadline_seconds: default_batch_deadline(),
        }
    }
}

impl OrchestratorConfig {
    /// Worker pool size; never below one
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_seconds)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_secs(self.batch_deadline_seconds)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let kind = std::env::var("ACCTOPS_DIRECTORY").unwrap_or_else(|_| default_directory_kind());

        let http = match std::env::var("ACCTOPS_GATEWAY_URL") {
            Ok(base_url) => Some(HttpDirectoryConfig {
                base_url,
                timeout_seconds: env_number("ACCTOPS_GATEWAY_TIMEOUT")
                    .unwrap_or_else(default_http_timeout),
                headers: None,
            }),
            Err(_) => None,
        };

        let directory = DirectoryConfig {
            kind,
            custom_attributes: std::env::var("ACCTOPS_CUSTOM_ATTRIBUTES")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            powershell: PowerShellConfig {
                executable: std::env::var("ACCTOPS_POWERSHELL")
                    .unwrap_or_else(|_| default_powershell_executable()),
            },
            http,
        };

        let orchestrator = OrchestratorConfig {
            max_concurrency: env_number("ACCTOPS_MAX_CONCURRENCY")
                .unwrap_or_else(default_max_concurrency),
            invocation_timeout_seconds: env_number("ACCTOPS_INVOCATION_TIMEOUT")
                .unwrap_or_else(default_invocation_timeout),
            batch_deadline_seconds: env_number("ACCTOPS_BATCH_DEADLINE")
                .unwrap_or_else(default_batch_deadline),
        };

        Ok(Self {
            directory,
            orchestrator,
            audit: None,
        })
    }

    /// Create a sample configuration file
    pub fn create_sample<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample = Self {
            directory: DirectoryConfig {
                kind: default_directory_kind(),
                custom_attributes: vec!["employeeID".to_string()],
                powershell: PowerShellConfig::default(),
                http: Some(HttpDirectoryConfig {
                    base_url: "https://directory-gateway.internal".to_string(),
                    timeout_seconds: default_http_timeout(),
                    headers: None,
                }),
            },
            orchestrator: OrchestratorConfig::default(),
            audit: Some(AuditConfig {
                postgres: PostgresAuditConfig {
                    host: "localhost".to_string(),
                    port: default_postgres_port(),
                    username: "acctops".to_string(),
                    password: "your-audit-db-password-here".to_string(),
                    database: "acctops".to_string(),
                    ssl_mode: default_ssl_mode(),
                },
            }),
        };

        let toml_string =
            toml::to_string_pretty(&sample).context("Failed to serialize sample config")?;
        fs::write(path.as_ref(), toml_string)
            .with_context(|| format!("Failed to write sample config to {:?}", path.as_ref()))?;

        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acctops.toml");
        fs::write(&path, "[directory]\nkind = \"http\"\n\n[directory.http]\nbase_url = \"https://gw\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.directory.kind, "http");
        assert_eq!(config.directory.http.unwrap().timeout_seconds, 30);
        assert_eq!(config.directory.powershell.executable, "powershell.exe");
        assert_eq!(config.orchestrator.max_concurrency, 4);
        assert_eq!(config.orchestrator.invocation_timeout(), Duration::from_secs(30));
        assert!(config.audit.is_none());
    }

    #[test]
    fn test_sample_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.toml");

        Config::create_sample(&path).unwrap();
        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.directory.custom_attributes, vec!["employeeID"]);
        assert_eq!(config.orchestrator.batch_deadline_seconds, 120);
        assert_eq!(config.audit.unwrap().postgres.port, 5432);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::from_file(dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_concurrency_never_zero() {
        let config = OrchestratorConfig {
            max_concurrency: 0,
            ..OrchestratorConfig::default()
        };
        assert_eq!(config.concurrency(), 1);
    }
}
