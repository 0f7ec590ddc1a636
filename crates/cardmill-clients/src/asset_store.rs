//! HTTP client for the asset storage provider.
//!
//! The provider exposes a presigned-transfer API keyed by `x-api-key`:
//! `POST /assets` returns an upload URI for a key, `GET /assets/{key}`
//! returns a short-lived download URI, and bytes move over plain PUTs to
//! the presigned location. Any non-success response is a fatal step
//! failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use cardmill_core::{defaults, AssetStore, Error, Result};

/// Configuration for the asset storage client.
#[derive(Debug, Clone)]
pub struct AssetStoreConfig {
    /// Base URL of the storage API.
    pub base_url: String,
    /// API key sent as `x-api-key` on every call.
    pub api_key: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl AssetStoreConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_seconds: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

/// Asset storage client over HTTP.
pub struct HttpAssetStore {
    client: Client,
    config: AssetStoreConfig,
}

impl HttpAssetStore {
    pub fn new(config: AssetStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Percent-encode each path segment of an asset key, preserving `/`.
    fn encoded_key_path(asset_key: &str) -> String {
        asset_key
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Read a response body for error context, tolerating read failures.
async fn body_text(res: reqwest::Response) -> String {
    res.text().await.unwrap_or_default()
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn request_upload_location(&self, asset_key: &str) -> Result<String> {
        let url = format!("{}/assets", self.config.base_url);
        let res = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(&serde_json::json!({ "keyName": asset_key }))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("POST {url} failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            return Err(Error::Upstream(format!(
                "POST {url} failed: {status} {}",
                body_text(res).await
            )));
        }

        let data: Value = res
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("POST {url} returned invalid JSON: {e}")))?;
        data.get("uploadUri")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Upstream(format!("POST /assets missing uploadUri (assetKey={asset_key})"))
            })
    }

    async fn transfer_bytes(
        &self,
        location: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        debug!(location, content_type, len = bytes.len(), "Transferring bytes");
        let res = self
            .client
            .put(location)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("PUT upload location failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            return Err(Error::Upstream(format!(
                "PUT upload location failed: {status} {}",
                body_text(res).await
            )));
        }
        Ok(())
    }

    async fn request_download_url(&self, asset_key: &str) -> Result<String> {
        let url = format!(
            "{}/assets/{}",
            self.config.base_url,
            Self::encoded_key_path(asset_key)
        );
        let res = self
            .client
            .get(&url)
            .header("x-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("GET {url} failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            return Err(Error::Upstream(format!(
                "GET {url} failed: {status} {}",
                body_text(res).await
            )));
        }

        let data: Value = res
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("GET {url} returned invalid JSON: {e}")))?;
        data.get("downloadUri")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Upstream(format!("Missing downloadUri (assetKey={asset_key})")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_key_path_preserves_separators() {
        assert_eq!(
            HttpAssetStore::encoded_key_path("cards/o 1.png"),
            "cards/o%201.png"
        );
    }

    #[test]
    fn test_encoded_key_path_plain() {
        assert_eq!(HttpAssetStore::encoded_key_path("b1.png"), "b1.png");
    }
}
