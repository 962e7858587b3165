//! CLI parsing and command execution
//!
//! This module handles command-line argument parsing and routes commands to the appropriate handlers.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use account_ops::audit::{AuditInstance, PostgresAuditLog};
use account_ops::directories::{
    DirectoryInstance, DirectoryType, HttpDirectory, PowerShellDirectory,
};
use account_ops::{generate_password, AccountOperations, Config, CredentialContext};

#[derive(Parser)]
#[command(name = "acctops")]
#[command(about = "Search directory accounts and run bulk disable, password reset and unlock", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "ACCTOPS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory implementation to use (powershell or http, overrides config file)
    #[arg(long, env = "ACCTOPS_DIRECTORY")]
    pub directory: Option<String>,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Operator credentials, supplied per invocation and never stored
#[derive(Args)]
pub struct CredentialArgs {
    /// Directory server address (domain controller)
    #[arg(long, env = "DIRECTORY_SERVER", global = true)]
    pub server: Option<String>,

    /// Operator account used against the directory
    #[arg(long, env = "DIRECTORY_OPERATOR", global = true)]
    pub operator: Option<String>,

    /// Operator password
    #[arg(long, env = "DIRECTORY_OPERATOR_SECRET", hide_env_values = true, global = true)]
    pub operator_secret: Option<String>,
}

impl CredentialArgs {
    fn into_context(self) -> CredentialContext {
        CredentialContext::new(
            self.server.unwrap_or_default(),
            self.operator.unwrap_or_default(),
            self.operator_secret.unwrap_or_default(),
        )
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a sample configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "acctops.toml")]
        output: PathBuf,
    },

    /// Search accounts by display name, one term per line or comma
    Search {
        /// Search terms (reads stdin when neither this nor --file is given)
        input: Option<String>,

        /// Read search terms from a file
        #[arg(short, long, conflicts_with = "input")]
        file: Option<PathBuf>,
    },

    /// Disable one or more accounts under a ticket reference
    Disable {
        /// Ticket or change reference for the whole batch
        #[arg(short, long)]
        reference: String,

        /// SAM account names to disable
        targets: Vec<String>,

        /// Read additional SAM account names from a file, one per line
        #[arg(long)]
        targets_file: Option<PathBuf>,
    },

    /// Reset the password of one account
    ResetPassword {
        /// SAM account name
        target: String,

        /// Ticket or incident reference
        #[arg(short, long)]
        reference: String,

        /// New password
        #[arg(
            long,
            env = "ACCTOPS_NEW_PASSWORD",
            hide_env_values = true,
            conflicts_with = "generate",
            required_unless_present = "generate"
        )]
        password: Option<String>,

        /// Generate a random password instead of supplying one
        #[arg(long)]
        generate: bool,

        /// Length of the generated password
        #[arg(long, default_value = "16")]
        length: usize,

        /// Require the user to change the password at next sign-in
        #[arg(long)]
        temporary: bool,
    },

    /// Show recent entries from the action log
    History {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "100")]
        limit: i64,
    },

    /// Unlock one account
    Unlock {
        /// SAM account name
        target: String,

        /// Ticket or incident reference
        #[arg(short, long)]
        reference: String,
    },
}

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    // Handle init command separately as it doesn't need a directory
    if let Commands::Init { output } = cli.command {
        Config::create_sample(&output)
            .with_context(|| format!("Failed to create sample config at {:?}", output))?;
        info!("Sample configuration created at {:?}", output);
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(config_path) = cli.config {
        Config::from_file(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        Config::from_env().context("Failed to load config from environment")?
    };

    // Override directory selection if provided
    if let Some(directory) = cli.directory {
        config.directory.kind = directory.to_lowercase();
    }

    // History only reads the action log
    if let Commands::History { limit } = cli.command {
        let audit_config = config.audit.as_ref().ok_or_else(|| {
            anyhow::anyhow!("Audit configuration not found. Configure the [audit.postgres] section")
        })?;
        let audit = PostgresAuditLog::connect(&audit_config.postgres)
            .await
            .context("Failed to create PostgreSQL audit log")?;
        let records = audit.recent(limit).await?;

        print_json(&json!({
            "success": true,
            "count": records.len(),
            "records": records,
        }))?;
        return Ok(());
    }

    let directory = create_directory(&config)?;
    let mut operations = AccountOperations::new(directory, config.orchestrator.clone())
        .with_custom_attributes(config.directory.custom_attributes.clone());
    if let Some(audit) = create_audit(&config).await? {
        operations = operations.with_audit(audit);
    }

    let credentials = cli.credentials.into_context();

    match cli.command {
        Commands::Init { .. } | Commands::History { .. } => unreachable!(), // Handled above

        Commands::Search { input, file } => {
            let raw_input = match (input, file) {
                (Some(input), _) => input,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read search input from {:?}", path))?,
                (None, None) => {
                    let mut buffer = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buffer)
                        .await
                        .context("Failed to read search input from stdin")?;
                    buffer
                }
            };

            let response = operations
                .search(&raw_input, &credentials)
                .await
                .context("Search rejected")?;

            for err in &response.errors {
                error!("{}", err);
            }
            print_json(&response)?;
        }

        Commands::Disable {
            reference,
            mut targets,
            targets_file,
        } => {
            if let Some(path) = targets_file {
                let contents = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read targets from {:?}", path))?;
                targets.extend(contents.lines().map(String::from));
            }

            let report = operations
                .bulk_disable(&targets, &reference, &credentials)
                .await
                .context("Bulk disable rejected")?;

            if report.failed() > 0 {
                error!(
                    "{} of {} account(s) could not be disabled",
                    report.failed(),
                    report.total()
                );
            }
            print_json(&json!({
                "ticket_number": reference.trim(),
                "report": report,
            }))?;
        }

        Commands::ResetPassword {
            target,
            reference,
            password,
            generate,
            length,
            temporary,
        } => {
            let (new_password, generated) = match password {
                Some(password) if !generate => (password, false),
                _ => (generate_password(length), true),
            };

            let outcome = operations
                .reset_password(&target, &new_password, temporary, &reference, &credentials)
                .await
                .context("Password reset rejected")?;

            let mut value = serde_json::to_value(&outcome).context("Failed to serialize outcome")?;
            value["password_type"] = json!(if temporary { "temporary" } else { "permanent" });
            if generated && outcome.is_success() {
                eprintln!("WARNING: The generated password will be displayed. Ensure this output is secured.");
                value["generated_password"] = json!(new_password);
            }
            print_json(&value)?;
        }

        Commands::Unlock { target, reference } => {
            let outcome = operations
                .unlock(&target, &reference, &credentials)
                .await
                .context("Unlock rejected")?;
            print_json(&outcome)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}

/// Create a directory instance based on configuration
fn create_directory(config: &Config) -> Result<DirectoryInstance> {
    let kind: DirectoryType = config
        .directory
        .kind
        .parse()
        .map_err(anyhow::Error::msg)?;

    match kind {
        DirectoryType::PowerShell => Ok(Arc::new(PowerShellDirectory::new(
            &config.directory.powershell,
        ))),
        DirectoryType::Http => {
            let http_config = config.directory.http.as_ref().ok_or_else(|| {
                anyhow::anyhow!("HTTP directory configuration not found. Set ACCTOPS_GATEWAY_URL or configure [directory.http] section")
            })?;
            let directory =
                HttpDirectory::new(http_config).context("Failed to create HTTP directory")?;
            Ok(Arc::new(directory))
        }
    }
}

/// Connect the audit log if one is configured
async fn create_audit(config: &Config) -> Result<Option<AuditInstance>> {
    let Some(ref audit_config) = config.audit else {
        return Ok(None);
    };

    let audit = PostgresAuditLog::connect(&audit_config.postgres)
        .await
        .context("Failed to create PostgreSQL audit log")?;

    Ok(Some(Arc::new(audit)))
}
