//! HTTP client for the document merge service and its identity provider.
//!
//! Authentication is a client-credentials exchange against the identity
//! endpoint; submissions and status fetches carry both the client id (as
//! `x-api-key`) and the bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use cardmill_core::{defaults, Error, MergeRequest, MergeService, MergeSubmission, Result};

/// Default identity endpoint for the token exchange.
pub const DEFAULT_TOKEN_URL: &str = "https://ims-na1.adobelogin.com/ims/token/v3";

/// Default merge submission endpoint.
pub const DEFAULT_SUBMIT_URL: &str = "https://indesign.adobe.io/v3/merge-data";

/// Default scope list requested with each token.
pub const DEFAULT_SCOPE: &str = "openid,AdobeID,session,additional_info,read_organizations,\
firefly_api,ff_apis,indesign_services,cc_files,cc_libraries,creative_cloud,creative_sdk,\
indesign_sdk";

/// Configuration for the merge service client.
#[derive(Debug, Clone)]
pub struct MergeServiceConfig {
    pub token_url: String,
    pub submit_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub timeout_seconds: u64,
}

impl MergeServiceConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            submit_url: DEFAULT_SUBMIT_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: DEFAULT_SCOPE.to_string(),
            timeout_seconds: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

/// Merge service client over HTTP.
pub struct HttpMergeService {
    client: Client,
    config: MergeServiceConfig,
}

impl HttpMergeService {
    pub fn new(config: MergeServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

async fn body_text(res: reqwest::Response) -> String {
    res.text().await.unwrap_or_default()
}

#[async_trait]
impl MergeService for HttpMergeService {
    async fn authenticate(&self) -> Result<String> {
        let res = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Token request failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            return Err(Error::Upstream(format!(
                "Token request failed: {status} {}",
                body_text(res).await
            )));
        }

        let data: Value = res
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Token response invalid JSON: {e}")))?;
        data.get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Upstream("Token response missing access_token".to_string()))
    }

    async fn submit(&self, request: &MergeRequest, token: &str) -> Result<MergeSubmission> {
        let res = self
            .client
            .post(&self.config.submit_url)
            .header("x-api-key", &self.config.client_id)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Merge submit failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            return Err(Error::Upstream(format!(
                "Merge submit failed: {status} {}",
                body_text(res).await
            )));
        }

        let data: Value = res
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Merge submit response invalid JSON: {e}")))?;
        if data.get("statusUrl").and_then(Value::as_str).is_none() {
            return Err(Error::Upstream(
                "Merge response missing statusUrl".to_string(),
            ));
        }
        let submission: MergeSubmission = serde_json::from_value(data)?;
        debug!(merge_job_id = ?submission.job_id, "Merge job submitted");
        Ok(submission)
    }

    async fn fetch_status(&self, status_url: &str, token: &str) -> Result<Value> {
        let res = self
            .client
            .get(status_url)
            .header("x-api-key", &self.config.client_id)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to fetch job status: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            return Err(Error::Upstream(format!(
                "Failed to fetch job status: {status} {}",
                body_text(res).await
            )));
        }

        res.json()
            .await
            .map_err(|e| Error::Upstream(format!("Status response invalid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MergeServiceConfig::new("id", "secret");
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.submit_url, DEFAULT_SUBMIT_URL);
        assert!(config.scope.contains("indesign_services"));
    }
}
