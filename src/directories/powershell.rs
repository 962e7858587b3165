use anyhow::{Context, Result};
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::PowerShellConfig;
use crate::directories::directory::{
    ActionParams, Directory, LookupFilter, LookupRequest, MutationRequest,
};
use crate::model::DirectoryAccount;

const ENV_SERVER: &str = "ACCTOPS_SERVER";
const ENV_IDENTITY: &str = "ACCTOPS_IDENTITY";
const ENV_SECRET: &str = "ACCTOPS_SECRET";
const ENV_FILTER: &str = "ACCTOPS_FILTER";
const ENV_PROPERTIES: &str = "ACCTOPS_PROPERTIES";
const ENV_TARGET: &str = "ACCTOPS_TARGET";
const ENV_NEW_PASSWORD: &str = "ACCTOPS_NEW_PASSWORD";
const ENV_CHANGE_AT_LOGON: &str = "ACCTOPS_CHANGE_AT_LOGON";

// Every caller-supplied value reaches the script through the environment.
const PRELUDE: &str = r#"$ErrorActionPreference = 'Stop'
try {
    Import-Module ActiveDirectory
    $secure = ConvertTo-SecureString $env:ACCTOPS_SECRET -AsPlainText -Force
    $credential = New-Object System.Management.Automation.PSCredential($env:ACCTOPS_IDENTITY, $secure)
"#;

const EPILOGUE: &str = r#"
} catch {
    [Console]::Error.WriteLine($_.Exception.Message)
    exit 1
}
"#;

const LOOKUP_BODY: &str = r#"    $properties = $env:ACCTOPS_PROPERTIES -split ','
    Get-ADUser -Filter $env:ACCTOPS_FILTER -Server $env:ACCTOPS_SERVER -Credential $credential -Properties $properties |
        Select-Object -Property $properties |
        ConvertTo-Json -Compress -Depth 3"#;

const DISABLE_BODY: &str = r#"    Disable-ADAccount -Identity $env:ACCTOPS_TARGET -Server $env:ACCTOPS_SERVER -Credential $credential"#;

const UNLOCK_BODY: &str = r#"    Unlock-ADAccount -Identity $env:ACCTOPS_TARGET -Server $env:ACCTOPS_SERVER -Credential $credential"#;

const RESET_PASSWORD_BODY: &str = r#"    $newPassword = ConvertTo-SecureString $env:ACCTOPS_NEW_PASSWORD -AsPlainText -Force
    Set-ADAccountPassword -Identity $env:ACCTOPS_TARGET -NewPassword $newPassword -Reset -Server $env:ACCTOPS_SERVER -Credential $credential
    $changeAtLogon = $env:ACCTOPS_CHANGE_AT_LOGON -eq 'true'
    Set-ADUser -Identity $env:ACCTOPS_TARGET -ChangePasswordAtLogon $changeAtLogon -Server $env:ACCTOPS_SERVER -Credential $credential"#;

/// Directory backed by the ActiveDirectory PowerShell module.
pub struct PowerShellDirectory {
    executable: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<DirectoryAccount>),
    One(Box<DirectoryAccount>),
}

impl PowerShellDirectory {
    pub fn new(config: &PowerShellConfig) -> Self {
        Self {
            executable: config.executable.clone(),
        }
    }

    /// Render a filter in `Get-ADUser -Filter` syntax
    pub(crate) fn render_filter(filter: &LookupFilter) -> String {
        format!(
            "{} -like '{}'",
            filter.attribute,
            filter.pattern.replace('\'', "''")
        )
    }

    fn script(body: &str) -> String {
        format!("{}{}{}", PRELUDE, body, EPILOGUE)
    }

    fn mutation_body(params: &ActionParams) -> &'static str {
        match params {
            ActionParams::Disable { .. } => DISABLE_BODY,
            ActionParams::ResetPassword { .. } => RESET_PASSWORD_BODY,
            ActionParams::Unlock { .. } => UNLOCK_BODY,
        }
    }

    fn mutation_env(request: &MutationRequest) -> Vec<(&'static str, String)> {
        let mut env = vec![
            (ENV_SERVER, request.credentials.server().to_string()),
            (ENV_IDENTITY, request.credentials.identity().to_string()),
            (ENV_SECRET, request.credentials.secret().to_string()),
            (ENV_TARGET, request.target.clone()),
        ];

        if let ActionParams::ResetPassword {
            new_password,
            temporary,
            ..
        } = &request.params
        {
            env.push((ENV_NEW_PASSWORD, new_password.clone()));
            env.push((ENV_CHANGE_AT_LOGON, temporary.to_string()));
        }

        env
    }

    /// Run a script and return its trimmed stdout
    async fn run(&self, script: &str, env: Vec<(&'static str, String)>) -> Result<String> {
        let output = Command::new(&self.executable)
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                script,
            ])
            .envs(env)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| {
                format!("Failed to start PowerShell executable '{}'", self.executable)
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            anyhow::bail!(
                "PowerShell exited with {}: {}",
                output.status,
                if stderr.is_empty() {
                    "no error output"
                } else {
                    stderr.as_str()
                }
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Parse `ConvertTo-Json` output, which is a bare object for a single match
pub(crate) fn parse_lookup_output(stdout: &str) -> Result<Vec<DirectoryAccount>> {
    if stdout.is_empty() {
        return Ok(Vec::new());
    }

    let parsed: OneOrMany =
        serde_json::from_str(stdout).context("Failed to parse PowerShell JSON output")?;

    Ok(match parsed {
        OneOrMany::Many(accounts) => accounts,
        OneOrMany::One(account) => vec![*account],
    })
}

#[async_trait::async_trait]
impl Directory for PowerShellDirectory {
    async fn lookup(&self, request: &LookupRequest) -> Result<Vec<DirectoryAccount>> {
        let filter = Self::render_filter(&request.filter);
        debug!("Get-ADUser -Filter \"{}\"", filter);

        let env = vec![
            (ENV_SERVER, request.credentials.server().to_string()),
            (ENV_IDENTITY, request.credentials.identity().to_string()),
            (ENV_SECRET, request.credentials.secret().to_string()),
            (ENV_FILTER, filter),
            (ENV_PROPERTIES, request.attributes.join(",")),
        ];

        let stdout = self
            .run(&Self::script(LOOKUP_BODY), env)
            .await
            .context("Directory query failed")?;

        parse_lookup_output(&stdout)
    }

    async fn mutate(&self, request: &MutationRequest) -> Result<()> {
        let action = request.params.action();
        info!("Running {} for {}", action, request.target);

        self.run(
            &Self::script(Self::mutation_body(&request.params)),
            Self::mutation_env(request),
        )
        .await
        .with_context(|| format!("Failed to {} account {}", action, request.target))?;

        Ok(())
    }

    fn directory_type(&self) -> &'static str {
        "powershell"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialContext;
    use crate::model::SearchTerm;

    fn credentials() -> CredentialContext {
        CredentialContext::new("192.168.1.22", "CORP\\ops", "hunter2")
    }

    #[test]
    fn test_render_filter_escapes_quotes() {
        let term = SearchTerm::new("O'Brien").unwrap();
        let filter = LookupFilter::display_name_contains(&term);
        assert_eq!(
            PowerShellDirectory::render_filter(&filter),
            "Name -like '*O''Brien*'"
        );
    }

    #[test]
    fn test_parse_single_object() {
        let stdout = r#"{"Name":"John Doe","SamAccountName":"jdoe","UserPrincipalName":"jdoe@corp.example","DistinguishedName":"CN=John Doe,DC=corp","Enabled":true,"LockedOut":true}"#;
        let accounts = parse_lookup_output(stdout).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].sam_account_name, "jdoe");
        assert!(accounts[0].locked);
    }

    #[test]
    fn test_parse_array() {
        let stdout = r#"[{"Name":"A","SamAccountName":"a","Enabled":true},{"Name":"B","SamAccountName":"b","Enabled":false}]"#;
        let accounts = parse_lookup_output(stdout).unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(!accounts[1].enabled);
    }

    #[test]
    fn test_parse_record_with_display_name_attribute() {
        let stdout = r#"{"Name":"jdoe","DisplayName":"Doe, John","SamAccountName":"jdoe","Enabled":null,"LockedOut":false}"#;
        let accounts = parse_lookup_output(stdout).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].display_name, "jdoe");
        assert!(!accounts[0].enabled);
        assert_eq!(accounts[0].custom_fields["DisplayName"], "Doe, John");
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_lookup_output("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_lookup_output("WARNING: something odd").is_err());
    }

    #[test]
    fn test_scripts_never_embed_caller_values() {
        let request = MutationRequest {
            target: "jdoe".to_string(),
            params: ActionParams::ResetPassword {
                new_password: "Temp#Pass1".to_string(),
                temporary: true,
                reference: "INC-7".to_string(),
            },
            credentials: credentials(),
        };

        let script = PowerShellDirectory::script(PowerShellDirectory::mutation_body(&request.params));
        assert!(script.contains("Set-ADAccountPassword"));
        assert!(!script.contains("Temp#Pass1"));
        assert!(!script.contains("hunter2"));
        assert!(!script.contains("jdoe"));

        let env = PowerShellDirectory::mutation_env(&request);
        assert!(env.contains(&(ENV_NEW_PASSWORD, "Temp#Pass1".to_string())));
        assert!(env.contains(&(ENV_CHANGE_AT_LOGON, "true".to_string())));
        assert!(env.contains(&(ENV_TARGET, "jdoe".to_string())));
    }

    #[test]
    fn test_disable_env_has_no_password_vars() {
        let request = MutationRequest {
            target: "jdoe".to_string(),
            params: ActionParams::Disable {
                reference: "CHG-1".to_string(),
            },
            credentials: credentials(),
        };

        let env = PowerShellDirectory::mutation_env(&request);
        assert!(env.iter().all(|(key, _)| *key != ENV_NEW_PASSWORD));
        assert!(PowerShellDirectory::mutation_body(&request.params).contains("Disable-ADAccount"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_an_error() {
        let directory = PowerShellDirectory::new(&PowerShellConfig {
            executable: "acctops-no-such-shell".to_string(),
        });
        let request = LookupRequest {
            filter: LookupFilter::display_name_contains(&SearchTerm::new("doe").unwrap()),
            attributes: vec!["Name".to_string()],
            credentials: credentials(),
        };

        let err = directory.lookup(&request).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to start PowerShell executable"));
    }
}
