use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::HttpDirectoryConfig;
use crate::credentials::CredentialContext;
use crate::directories::directory::{
    ActionParams, Directory, LookupFilter, LookupRequest, MutationRequest,
};
use crate::model::DirectoryAccount;

/// Directory reached through a REST management gateway
pub struct HttpDirectory {
    config: Arc<HttpDirectoryConfig>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    server: &'a str,
    filter: &'a LookupFilter,
    attributes: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SearchReply {
    #[serde(default)]
    accounts: Vec<DirectoryAccount>,
}

impl HttpDirectory {
    /// Create a new HttpDirectory
    pub fn new(config: &HttpDirectoryConfig) -> Result<Self> {
        info!("Creating HTTP directory gateway for: {}", config.base_url);

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config: Arc::new(config.clone()),
            client,
        })
    }

    pub(crate) fn build_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn mutation_body(request: &MutationRequest) -> serde_json::Value {
        let mut body = json!({
            "server": request.credentials.server(),
            "reference": request.params.reference(),
        });

        if let ActionParams::ResetPassword {
            new_password,
            temporary,
            ..
        } = &request.params
        {
            body["new_password"] = json!(new_password);
            body["change_password_at_logon"] = json!(temporary);
        }

        body
    }

    async fn post(
        &self,
        url: &str,
        body: &impl Serialize,
        credentials: &CredentialContext,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(url)
            .basic_auth(credentials.identity(), Some(credentials.secret()))
            .json(body);

        if let Some(ref headers) = self.config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request
            .send()
            .await
            .context("Failed to send directory gateway request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!(
                "Directory gateway request failed with status {}: {}",
                status,
                error_text.trim()
            );
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl Directory for HttpDirectory {
    async fn lookup(&self, request: &LookupRequest) -> Result<Vec<DirectoryAccount>> {
        let url = self.build_url("accounts/search");
        debug!("Calling directory gateway: {}", url);

        let body = SearchBody {
            server: request.credentials.server(),
            filter: &request.filter,
            attributes: &request.attributes,
        };

        let reply: SearchReply = self
            .post(&url, &body, &request.credentials)
            .await?
            .json()
            .await
            .context("Failed to parse directory gateway search response")?;

        Ok(reply.accounts)
    }

    async fn mutate(&self, request: &MutationRequest) -> Result<()> {
        let action = request.params.action();
        let url = self.build_url(&format!(
            "accounts/{}/{}",
            urlencoding::encode(&request.target),
            action
        ));
        info!("Requesting {} for {} via directory gateway", action, request.target);

        self.post(&url, &Self::mutation_body(request), &request.credentials)
            .await
            .with_context(|| format!("Failed to {} account {}", action, request.target))?;

        Ok(())
    }

    fn directory_type(&self) -> &'static str {
        "http"
    }
}
