//! Push transport configuration.

use std::time::Duration;

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::retry::RetryPolicy;

/// Default topic namespace.
pub const DEFAULT_NAMESPACE: &str = "courier";

/// Push bridge and transport configuration.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Transport endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Topic namespace.
    pub namespace: String,
    /// Notification topic, `<namespace>/notifications` unless overridden.
    pub topic: String,
    /// Whether the transport restores subscriptions after a reconnect.
    pub restores_subscriptions: bool,
    /// Delay before the first reconnect attempt; doubles afterwards.
    pub reconnect_initial_backoff: Duration,
    /// Reconnect attempts before the transport gives up.
    pub reconnect_max_attempts: usize,
    /// Treat unknown actions as forward-compatible rather than malformed.
    pub accept_unknown_actions: bool,
}

impl PushConfig {
    /// Creates a config for `url` with defaults elsewhere.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            topic: notifications_topic(DEFAULT_NAMESPACE),
            restores_subscriptions: false,
            reconnect_initial_backoff: Duration::from_millis(250),
            reconnect_max_attempts: 10,
            accept_unknown_actions: false,
        }
    }

    /// Parses a [`PushConfig`] from a [`ConnectorConfig`].
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if required fields are missing or values are invalid.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let defaults = Self::new(config.require("url")?);

        let namespace = config
            .get("namespace")
            .map_or(defaults.namespace.clone(), str::to_string);
        let topic = config
            .get("topic")
            .map_or_else(|| notifications_topic(&namespace), str::to_string);

        let cfg = Self {
            namespace,
            topic,
            restores_subscriptions: config
                .get_parsed_or("restores.subscriptions", defaults.restores_subscriptions)?,
            reconnect_initial_backoff: config.get_millis("reconnect.initial.backoff.ms", 250)?,
            reconnect_max_attempts: config
                .get_parsed_or("reconnect.max.attempts", defaults.reconnect_max_attempts)?,
            accept_unknown_actions: config
                .get_parsed_or("accept.unknown.actions", defaults.accept_unknown_actions)?,
            ..defaults
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` for invalid values.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(ConnectorError::ConfigurationError(format!(
                "url must start with ws:// or wss://, got '{}'",
                self.url
            )));
        }
        if self.namespace.trim().is_empty() {
            return Err(ConnectorError::ConfigurationError(
                "namespace cannot be empty".into(),
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(ConnectorError::ConfigurationError(
                "topic cannot be empty".into(),
            ));
        }
        if self.reconnect_max_attempts == 0 {
            return Err(ConnectorError::ConfigurationError(
                "reconnect.max.attempts must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Returns the transport reconnect policy.
    #[must_use]
    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.reconnect_max_attempts, self.reconnect_initial_backoff)
            .with_max_backoff(Duration::from_secs(30))
    }
}

/// Returns `<namespace>/notifications`.
#[must_use]
pub fn notifications_topic(namespace: &str) -> String {
    format!("{namespace}/notifications")
}
