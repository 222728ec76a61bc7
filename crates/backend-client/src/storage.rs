//! Blob storage client
//!
//! Binary upload plus public and time-limited signed retrieval URLs for
//! attached media.

use serde::Deserialize;

use crate::config::BackendConfig;
use crate::TokenStore;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success response from the storage service.
    #[error("storage error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the backend.
        message: String,
    },

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// HTTP client for the blob storage surface.
#[derive(Debug, Clone)]
pub struct BlobClient {
    http: reqwest::Client,
    config: BackendConfig,
    token: TokenStore,
}

impl BlobClient {
    /// Create a client from a config and the shared token store.
    pub fn new(config: BackendConfig, token: TokenStore) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_default();
        Self { http, config, token }
    }

    /// Upload `bytes` to `bucket/path`, returning the stored object path.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.config.service_url(),
            bucket,
            path
        );
        let response = self
            .http
            .post(url)
            .header("apikey", self.config.api_key())
            .bearer_auth(self.bearer().await)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(path.to_string())
    }

    /// Public (unsigned) retrieval URL for an object.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.service_url(),
            bucket,
            path
        )
    }

    /// Create a signed retrieval URL valid for `ttl_seconds`.
    pub async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_seconds: u64,
    ) -> Result<String> {
        let url = format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.config.service_url(),
            bucket,
            path
        );
        let response = self
            .http
            .post(url)
            .header("apikey", self.config.api_key())
            .bearer_auth(self.bearer().await)
            .json(&serde_json::json!({ "expiresIn": ttl_seconds }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StorageError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let signed: SignedUrlResponse = serde_json::from_str(&body)?;
        // The service returns a path relative to the storage root.
        Ok(format!(
            "{}/storage/v1{}",
            self.config.service_url(),
            signed.signed_url
        ))
    }

    async fn bearer(&self) -> String {
        let token = self.token.read().await;
        token
            .clone()
            .unwrap_or_else(|| self.config.api_key().to_string())
    }
}
