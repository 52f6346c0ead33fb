//! Notification store client configuration.

use std::time::Duration;

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;

/// REST store client configuration.
#[derive(Clone)]
pub struct StoreConfig {
    /// Base URL of the store API, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Optional bearer token.
    pub auth_token: Option<String>,
}

impl StoreConfig {
    /// Creates a config for `base_url` with defaults elsewhere.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(10),
            auth_token: None,
        }
    }

    /// Parses a [`StoreConfig`] from a [`ConnectorConfig`].
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if required fields are missing or values are invalid.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let mut cfg = Self::new(config.require("base.url")?);
        cfg.request_timeout = config.get_millis("request.timeout.ms", 10_000)?;
        cfg.auth_token = config
            .get("auth.token")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` for invalid values.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConnectorError::ConfigurationError(format!(
                "base.url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ConnectorError::ConfigurationError(
                "request.timeout.ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = ConnectorConfig::new("store");
        config.set("base.url", "http://localhost:3000/api/");
        config.set("auth.token", "secret");
        let cfg = StoreConfig::from_config(&config).unwrap();

        assert_eq!(cfg.base_url, "http://localhost:3000/api");
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.auth_token.as_deref(), Some("secret"));
        assert!(!format!("{cfg:?}").contains("secret"));
    }

    #[test]
    fn test_invalid() {
        let config = ConnectorConfig::new("store");
        assert!(matches!(
            StoreConfig::from_config(&config),
            Err(ConnectorError::MissingConfig(ref key)) if key == "store.base.url"
        ));

        let mut config = ConnectorConfig::new("store");
        config.set("base.url", "ftp://x");
        assert!(StoreConfig::from_config(&config).is_err());

        config.set("base.url", "http://x");
        config.set("request.timeout.ms", "0");
        assert!(StoreConfig::from_config(&config).is_err());
    }
}
