//! PostgREST-style table access
//!
//! Thin typed client for the backend's relational REST surface. Queries are
//! built with [`TableQuery`] (equality filters, ordering, limit) and executed
//! with [`RestClient::select`]; writes go through [`RestClient::insert`] and
//! [`RestClient::update`]. Row-level security is enforced server-side; the
//! client only attaches the caller's bearer token.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::BackendConfig;
use crate::TokenStore;

/// Errors from the REST surface.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success response from the backend.
    #[error("backend error ({status}): {message}")]
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

/// Result type for REST operations.
pub type Result<T> = std::result::Result<T, RestError>;

/// Builder for a table read.
///
/// # Example
/// ```
/// use backend_client::rest::TableQuery;
///
/// let query = TableQuery::new("messages")
///     .eq("channel_name", "general")
///     .order_asc("created_at")
///     .limit(200);
/// assert_eq!(query.table(), "messages");
/// ```
#[derive(Debug, Clone)]
pub struct TableQuery {
    table: String,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<u32>,
}

impl TableQuery {
    /// Start a query against `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Add an equality filter on `column`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters
            .push((column.into(), format!("eq.{}", value.into())));
        self
    }

    /// Order ascending by `column`.
    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(format!("{}.asc", column.into()));
        self
    }

    /// Cap the number of returned rows.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Target table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = self.filters.clone();
        if let Some(order) = &self.order {
            pairs.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// HTTP client for the relational REST surface.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    config: BackendConfig,
    token: TokenStore,
}

impl RestClient {
    /// Create a client from a config and a shared token store.
    pub fn new(config: BackendConfig, token: TokenStore) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_default();
        Self { http, config, token }
    }

    /// Run a read query, decoding the rows as `T`.
    pub async fn select<T: DeserializeOwned>(&self, query: &TableQuery) -> Result<Vec<T>> {
        let response = self
            .http
            .get(self.table_url(query.table()))
            .headers(self.headers().await)
            .query(&query.query_pairs())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RestError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Insert a single row.
    pub async fn insert<T: Serialize>(&self, table: &str, row: &T) -> Result<()> {
        let mut headers = self.headers().await;
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));

        let response = self
            .http
            .post(self.table_url(table))
            .headers(headers)
            .json(row)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Patch rows matching an equality filter on `column`.
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: &T,
    ) -> Result<()> {
        let mut headers = self.headers().await;
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));

        let response = self
            .http
            .patch(self.table_url(table))
            .headers(headers)
            .query(&[(column, format!("eq.{value}"))])
            .json(patch)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Count rows where `column` equals `value` without transferring them.
    ///
    /// Issues a HEAD request with `Prefer: count=exact`; the total comes back
    /// in the `Content-Range` header (for example `0-0/1`, or `*/0` when
    /// nothing matches).
    pub async fn count_eq(&self, table: &str, column: &str, value: &str) -> Result<u64> {
        let mut headers = self.headers().await;
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        let response = self
            .http
            .head(self.table_url(table))
            .headers(headers)
            .query(&[(column, format!("eq.{value}"))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RestError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let count = response
            .headers()
            .get("content-range")
            .and_then(|range| range.to_str().ok())
            .and_then(|range| range.rsplit('/').next())
            .and_then(|total| total.parse().ok())
            .unwrap_or(0);
        Ok(count)
    }

    async fn check_status(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(RestError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.service_url(), table)
    }

    async fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(self.config.api_key()) {
            headers.insert("apikey", value);
        }
        // The signed-in access token when present, the anon key otherwise.
        let bearer = {
            let token = self.token.read().await;
            token
                .clone()
                .unwrap_or_else(|| self.config.api_key().to_string())
        };
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {bearer}")) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}
