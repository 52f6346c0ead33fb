//! Connector configuration types.
//!
//! Provides a generic configuration model for connectors:
//! - [`ConnectorConfig`]: Key-value configuration with typed accessors
//! - [`SessionState`]: Connection state of a single session role

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::ConnectorError;

/// Configuration for a connector instance.
///
/// Connectors receive their configuration as a string key-value map,
/// typically flattened from a settings file section.
#[derive(Debug, Clone, Default)]
pub struct ConnectorConfig {
    /// The section this configuration came from (e.g., "broker", "push").
    section: String,

    /// Configuration properties.
    properties: HashMap<String, String>,
}

impl ConnectorConfig {
    /// Creates a new, empty config for the given section.
    #[must_use]
    pub fn new(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            properties: HashMap::new(),
        }
    }

    /// Creates a config from existing properties.
    #[must_use]
    pub fn with_properties(section: impl Into<String>, properties: HashMap<String, String>) -> Self {
        Self {
            section: section.into(),
            properties,
        }
    }

    /// Returns the section name.
    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Sets a configuration property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Gets a configuration property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Gets a required configuration property, returning an error if missing.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` if the key is not set.
    pub fn require(&self, key: &str) -> Result<&str, ConnectorError> {
        self.get(key)
            .ok_or_else(|| ConnectorError::MissingConfig(format!("{}.{key}", self.section)))
    }

    /// Gets a property parsed as the given type.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the value cannot be parsed.
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConnectorError>
    where
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(v) => v.trim().parse::<T>().map(Some).map_err(|e| {
                ConnectorError::ConfigurationError(format!("invalid value for '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Gets a property parsed as the given type, or `default` if unset.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the value cannot be parsed.
    pub fn get_parsed_or<T: std::str::FromStr>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConnectorError>
    where
        T::Err: fmt::Display,
    {
        Ok(self.get_parsed(key)?.unwrap_or(default))
    }

    /// Gets a millisecond property as a [`Duration`], or `default_ms` if unset.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the value is not an integer.
    pub fn get_millis(&self, key: &str, default_ms: u64) -> Result<Duration, ConnectorError> {
        self.get_parsed_or(key, default_ms).map(Duration::from_millis)
    }

    /// Returns all properties as a reference.
    #[must_use]
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Returns properties with a given prefix, with the prefix stripped.
    #[must_use]
    pub fn properties_with_prefix(&self, prefix: &str) -> HashMap<String, String> {
        self.properties
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix)
                    .map(|stripped| (stripped.to_string(), v.clone()))
            })
            .collect()
    }
}

/// Connection state of one session role (producer or consumer).
///
/// ```text
/// Disconnected -> Connecting -> Connected
///      ^              |             |
///      +--------------+-------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session is open.
    #[default]
    Disconnected,

    /// A session is being opened.
    Connecting,

    /// A session is open and usable.
    Connected,
}

impl SessionState {
    /// Returns `true` if the session is usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Connected => write!(f, "Connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_basic_operations() {
        let mut config = ConnectorConfig::new("broker");
        config.set("bootstrap.servers", "localhost:9092");
        config.set("topic", "events");

        assert_eq!(config.section(), "broker");
        assert_eq!(config.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(config.get("topic"), Some("events"));
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn test_config_require_names_section() {
        let config = ConnectorConfig::new("push");
        let err = config.require("url").unwrap_err();
        assert_eq!(err.to_string(), "missing required config: push.url");
    }

    #[test]
    fn test_config_parsed() {
        let mut config = ConnectorConfig::new("broker");
        config.set("max.in.flight", "1");
        config.set("bad_number", "not_a_number");

        let size: Option<usize> = config.get_parsed("max.in.flight").unwrap();
        assert_eq!(size, Some(1));

        let missing: Option<usize> = config.get_parsed("missing").unwrap();
        assert_eq!(missing, None);

        let bad: Result<Option<usize>, _> = config.get_parsed("bad_number");
        assert!(bad.is_err());
    }

    #[test]
    fn test_config_millis() {
        let mut config = ConnectorConfig::new("broker");
        config.set("connection.timeout.ms", "1500");

        assert_eq!(
            config.get_millis("connection.timeout.ms", 3000).unwrap(),
            Duration::from_millis(1500)
        );
        assert_eq!(
            config.get_millis("request.timeout.ms", 25_000).unwrap(),
            Duration::from_secs(25)
        );
    }

    #[test]
    fn test_config_prefix_extraction() {
        let mut config = ConnectorConfig::new("broker");
        config.set("kafka.security.protocol", "SSL");
        config.set("kafka.linger.ms", "5");
        config.set("topic", "events");

        let kafka_props = config.properties_with_prefix("kafka.");
        assert_eq!(kafka_props.len(), 2);
        assert_eq!(
            kafka_props.get("security.protocol"),
            Some(&"SSL".to_string())
        );
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Connected.to_string(), "Connected");
        assert!(!SessionState::Connecting.is_connected());
        assert_eq!(SessionState::default(), SessionState::Disconnected);
    }
}
