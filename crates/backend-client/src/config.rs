//! Backend connection configuration
//!
//! The client needs exactly two environment-supplied credentials: the service
//! URL and the public (anon) API key. Missing credentials are a configuration
//! error surfaced at initialization; the client then falls back to placeholder
//! values that fail all subsequent calls gracefully instead of panicking.

use std::env;
use std::time::Duration;

/// Environment variable holding the backend service URL.
pub const SERVICE_URL_VAR: &str = "SITECHAT_SERVICE_URL";

/// Environment variable holding the public API key.
pub const ANON_KEY_VAR: &str = "SITECHAT_ANON_KEY";

/// Fallback service URL used when credentials are missing.
pub const PLACEHOLDER_URL: &str = "https://placeholder.invalid";

/// Fallback API key used when credentials are missing.
pub const PLACEHOLDER_KEY: &str = "anon-key-missing";

/// Default request timeout for all backend calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the backend service.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base service URL, without a trailing slash.
    service_url: String,
    /// Public (anon) API key sent with every request.
    api_key: String,
    /// Request timeout.
    timeout: Duration,
    /// Whether this config was built from placeholder fallbacks.
    placeholder: bool,
}

impl BackendConfig {
    /// Create a config from explicit credentials.
    pub fn new(service_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let service_url = service_url.into();
        Self {
            service_url: service_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            placeholder: false,
        }
    }

    /// Read the config from the environment.
    ///
    /// Missing variables are logged as a configuration error and replaced
    /// with placeholder values, so initialization never panics; the
    /// placeholder endpoint rejects every call instead.
    pub fn from_env() -> Self {
        let url = env::var(SERVICE_URL_VAR).ok().filter(|v| !v.is_empty());
        let key = env::var(ANON_KEY_VAR).ok().filter(|v| !v.is_empty());

        if url.is_none() || key.is_none() {
            tracing::error!(
                url_var = SERVICE_URL_VAR,
                key_var = ANON_KEY_VAR,
                "backend credentials missing; falling back to placeholder values"
            );
            let mut config = Self::new(
                url.unwrap_or_else(|| PLACEHOLDER_URL.to_string()),
                key.unwrap_or_else(|| PLACEHOLDER_KEY.to_string()),
            );
            config.placeholder = true;
            return config;
        }

        // Both present; unwraps above already handled the None arms.
        Self::new(url.unwrap_or_default(), key.unwrap_or_default())
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base service URL without a trailing slash.
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Public API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Request timeout for backend calls.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether this config was built from placeholder fallbacks.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = BackendConfig::new("https://chat.example.com/", "anon-key");
        assert_eq!(config.service_url(), "https://chat.example.com");
        assert_eq!(config.api_key(), "anon-key");
        assert!(!config.is_placeholder());
    }

    #[test]
    fn test_explicit_config_is_not_placeholder() {
        let config = BackendConfig::new("https://chat.example.com", "key");
        assert!(!config.is_placeholder());
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_with_timeout() {
        let config = BackendConfig::new("https://chat.example.com", "key")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }
}
