//! Broker client configuration.
//!
//! Provides [`BrokerConfig`] for the durable broker connection: address,
//! topic and group identity, connect/request timeouts, connect retry
//! bounds, and pass-through `rdkafka` properties.

use std::collections::HashMap;
use std::time::Duration;

#[cfg(feature = "kafka")]
use rdkafka::config::ClientConfig;

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::retry::RetryPolicy;

/// Default topic carrying notification events.
pub const DEFAULT_EVENTS_TOPIC: &str = "notification-events";

/// Broker client configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    // -- Required --
    /// Comma-separated list of broker addresses.
    pub bootstrap_servers: String,
    /// Consumer group identifier.
    pub group_id: String,

    // -- Identity --
    /// Topic carrying notification events.
    pub topic: String,
    /// Client identifier reported to the broker.
    pub client_id: Option<String>,

    // -- Timeouts --
    /// Bound on a single session open attempt.
    pub connection_timeout: Duration,
    /// Bound on a single broker request (publish acknowledgment).
    pub request_timeout: Duration,

    // -- Connect retry --
    /// Delay before the second connect attempt; doubles afterwards.
    pub retry_initial_backoff: Duration,
    /// Total connect attempts per session, including the first.
    pub retry_max_attempts: usize,
    /// Upper bound on the delay between connect attempts.
    pub retry_max_backoff: Duration,

    // -- Producer --
    /// Maximum unacknowledged publishes per connection.
    pub max_in_flight: usize,

    // -- Pass-through --
    /// Additional rdkafka properties passed directly to librdkafka.
    pub kafka_properties: HashMap<String, String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: String::new(),
            group_id: String::new(),
            topic: DEFAULT_EVENTS_TOPIC.to_string(),
            client_id: None,
            connection_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(25),
            retry_initial_backoff: Duration::from_millis(100),
            retry_max_attempts: 8,
            retry_max_backoff: Duration::from_secs(30),
            max_in_flight: 1,
            kafka_properties: HashMap::new(),
        }
    }
}

impl BrokerConfig {
    /// Creates a config for the given broker and group, with defaults elsewhere.
    #[must_use]
    pub fn new(bootstrap_servers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    /// Parses a [`BrokerConfig`] from a [`ConnectorConfig`].
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if required fields are missing or values are invalid.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let defaults = Self::default();

        let cfg = Self {
            bootstrap_servers: config.require("bootstrap.servers")?.to_string(),
            group_id: config.require("group.id")?.to_string(),
            topic: config
                .get("topic")
                .map_or(defaults.topic, str::to_string),
            client_id: config.get("client.id").map(str::to_string),
            connection_timeout: config.get_millis("connection.timeout.ms", 3000)?,
            request_timeout: config.get_millis("request.timeout.ms", 25_000)?,
            retry_initial_backoff: config.get_millis("retry.initial.backoff.ms", 100)?,
            retry_max_attempts: config
                .get_parsed_or("retry.max.attempts", defaults.retry_max_attempts)?,
            retry_max_backoff: config.get_millis("retry.max.backoff.ms", 30_000)?,
            max_in_flight: config.get_parsed_or("max.in.flight", defaults.max_in_flight)?,
            kafka_properties: config.properties_with_prefix("kafka."),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` for invalid combinations.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(ConnectorError::ConfigurationError(
                "bootstrap.servers cannot be empty".into(),
            ));
        }
        if self.group_id.trim().is_empty() {
            return Err(ConnectorError::ConfigurationError(
                "group.id cannot be empty".into(),
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(ConnectorError::ConfigurationError(
                "topic cannot be empty".into(),
            ));
        }
        if self.connection_timeout.is_zero() {
            return Err(ConnectorError::ConfigurationError(
                "connection.timeout.ms must be > 0".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConnectorError::ConfigurationError(
                "request.timeout.ms must be > 0".into(),
            ));
        }
        if self.retry_max_attempts == 0 {
            return Err(ConnectorError::ConfigurationError(
                "retry.max.attempts must be >= 1".into(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(ConnectorError::ConfigurationError(
                "max.in.flight must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Returns the broker address reported by `status()`.
    #[must_use]
    pub fn broker_address(&self) -> &str {
        &self.bootstrap_servers
    }

    /// Returns the retry policy for opening one session.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.retry_max_attempts.saturating_sub(1),
            self.retry_initial_backoff,
        )
        .with_max_backoff(self.retry_max_backoff)
    }

    /// Builds an rdkafka [`ClientConfig`] for the producer session.
    #[cfg(feature = "kafka")]
    #[must_use]
    pub fn to_producer_config(&self) -> ClientConfig {
        let mut config = self.base_rdkafka_config();
        config.set(
            "max.in.flight.requests.per.connection",
            self.max_in_flight.to_string(),
        );
        config.set("message.timeout.ms", millis(self.request_timeout));

        for (key, value) in &self.kafka_properties {
            config.set(key, value);
        }
        config
    }

    /// Builds an rdkafka [`ClientConfig`] for the consumer session.
    #[cfg(feature = "kafka")]
    #[must_use]
    pub fn to_consumer_config(&self) -> ClientConfig {
        let mut config = self.base_rdkafka_config();
        config.set("group.id", &self.group_id);
        config.set("enable.auto.commit", "true");
        config.set("auto.offset.reset", "latest");

        for (key, value) in &self.kafka_properties {
            config.set(key, value);
        }
        config
    }

    #[cfg(feature = "kafka")]
    fn base_rdkafka_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set(
            "socket.connection.setup.timeout.ms",
            millis(self.connection_timeout),
        );
        config.set("request.timeout.ms", millis(self.request_timeout));
        if let Some(ref client_id) = self.client_id {
            config.set("client.id", client_id);
        }
        config
    }
}

#[cfg(feature = "kafka")]
fn millis(d: Duration) -> String {
    d.as_millis().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(extra: &[(&str, &str)]) -> ConnectorConfig {
        let mut config = ConnectorConfig::new("broker");
        config.set("bootstrap.servers", "localhost:9092");
        config.set("group.id", "courier-relay");
        for (k, v) in extra {
            config.set(*k, *v);
        }
        config
    }

    #[test]
    fn test_parse_required_fields_and_defaults() {
        let cfg = BrokerConfig::from_config(&make_config(&[])).unwrap();
        assert_eq!(cfg.bootstrap_servers, "localhost:9092");
        assert_eq!(cfg.group_id, "courier-relay");
        assert_eq!(cfg.topic, DEFAULT_EVENTS_TOPIC);
        assert_eq!(cfg.connection_timeout, Duration::from_secs(3));
        assert_eq!(cfg.request_timeout, Duration::from_secs(25));
        assert_eq!(cfg.retry_initial_backoff, Duration::from_millis(100));
        assert_eq!(cfg.retry_max_attempts, 8);
        assert_eq!(cfg.max_in_flight, 1);
    }

    #[test]
    fn test_missing_bootstrap_servers() {
        let mut config = ConnectorConfig::new("broker");
        config.set("group.id", "g");
        let err = BrokerConfig::from_config(&config).unwrap_err();
        assert!(matches!(err, ConnectorError::MissingConfig(ref k) if k == "broker.bootstrap.servers"));
    }

    #[test]
    fn test_overrides() {
        let cfg = BrokerConfig::from_config(&make_config(&[
            ("topic", "alerts"),
            ("client.id", "relay-1"),
            ("connection.timeout.ms", "500"),
            ("retry.max.attempts", "3"),
            ("kafka.linger.ms", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.topic, "alerts");
        assert_eq!(cfg.client_id.as_deref(), Some("relay-1"));
        assert_eq!(cfg.connection_timeout, Duration::from_millis(500));
        assert_eq!(cfg.retry_max_attempts, 3);
        assert_eq!(cfg.kafka_properties.get("linger.ms").map(String::as_str), Some("5"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(BrokerConfig::from_config(&make_config(&[("retry.max.attempts", "0")])).is_err());
        assert!(BrokerConfig::from_config(&make_config(&[("max.in.flight", "0")])).is_err());
        assert!(BrokerConfig::from_config(&make_config(&[("request.timeout.ms", "abc")])).is_err());
        assert!(BrokerConfig::from_config(&make_config(&[("topic", " ")])).is_err());
    }

    #[test]
    fn test_retry_policy_counts_total_attempts() {
        let cfg = BrokerConfig::new("localhost:9092", "g");
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
    }

    #[cfg(feature = "kafka")]
    #[test]
    fn test_rdkafka_configs() {
        let mut cfg = BrokerConfig::new("b1:9092,b2:9092", "g");
        cfg.kafka_properties
            .insert("security.protocol".into(), "SSL".into());

        let producer = cfg.to_producer_config();
        assert_eq!(producer.get("bootstrap.servers"), Some("b1:9092,b2:9092"));
        assert_eq!(producer.get("max.in.flight.requests.per.connection"), Some("1"));
        assert_eq!(producer.get("socket.connection.setup.timeout.ms"), Some("3000"));
        assert_eq!(producer.get("request.timeout.ms"), Some("25000"));
        assert_eq!(producer.get("security.protocol"), Some("SSL"));
        assert_eq!(producer.get("group.id"), None);

        let consumer = cfg.to_consumer_config();
        assert_eq!(consumer.get("group.id"), Some("g"));
        assert_eq!(consumer.get("security.protocol"), Some("SSL"));
    }
}
