//! TOML settings file.
//!
//! ```toml
//! [broker]
//! "bootstrap.servers" = "localhost:9092"
//! "group.id" = "courier-relay"
//!
//! [broker.kafka]
//! "security.protocol" = "plaintext"
//!
//! [push]
//! url = "ws://localhost:8090"
//! namespace = "salon-7"
//!
//! [store]
//! "base.url" = "http://localhost:3000/api"
//! ```
//!
//! Each top-level table is flattened into a [`ConnectorConfig`]. Nested
//! tables become dotted keys, so `[broker.kafka]` above yields
//! `kafka.security.protocol`.

use std::path::{Path, PathBuf};

use courier_connectors::broker::BrokerConfig;
use courier_connectors::push::PushConfig;
use courier_connectors::store::StoreConfig;
use courier_connectors::{ConnectorConfig, ConnectorError};
use thiserror::Error;

/// Settings loading errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML.
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required section is absent.
    #[error("missing [{0}] section")]
    MissingSection(&'static str),

    /// A value has an unsupported type.
    #[error("unsupported value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A section failed validation.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

/// Parsed settings file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    broker: Option<ConnectorConfig>,
    push: Option<ConnectorConfig>,
    store: Option<ConnectorConfig>,
}

impl Settings {
    /// Reads and parses a settings file.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses settings from TOML text.
    ///
    /// Unknown top-level tables are ignored.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` for invalid TOML or unsupported values.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let table: toml::Table = toml::from_str(content)?;

        let mut settings = Self::default();
        for (name, value) in table {
            let slot = match name.as_str() {
                "broker" => &mut settings.broker,
                "push" => &mut settings.push,
                "store" => &mut settings.store,
                _ => continue,
            };
            let toml::Value::Table(section) = value else {
                return Err(SettingsError::InvalidValue {
                    key: name,
                    reason: "expected a table".into(),
                });
            };
            let mut config = ConnectorConfig::new(name.clone());
            flatten(&mut config, "", &section)?;
            *slot = Some(config);
        }
        Ok(settings)
    }

    /// Returns the raw `[broker]` section.
    #[must_use]
    pub fn broker_section(&self) -> Option<&ConnectorConfig> {
        self.broker.as_ref()
    }

    /// Returns the raw `[push]` section.
    #[must_use]
    pub fn push_section(&self) -> Option<&ConnectorConfig> {
        self.push.as_ref()
    }

    /// Returns the raw `[store]` section.
    #[must_use]
    pub fn store_section(&self) -> Option<&ConnectorConfig> {
        self.store.as_ref()
    }

    /// Parses the `[broker]` section.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the section is missing or invalid.
    pub fn broker(&self) -> Result<BrokerConfig, SettingsError> {
        let section = self
            .broker
            .as_ref()
            .ok_or(SettingsError::MissingSection("broker"))?;
        Ok(BrokerConfig::from_config(section)?)
    }

    /// Parses the `[push]` section.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the section is missing or invalid.
    pub fn push(&self) -> Result<PushConfig, SettingsError> {
        let section = self
            .push
            .as_ref()
            .ok_or(SettingsError::MissingSection("push"))?;
        Ok(PushConfig::from_config(section)?)
    }

    /// Parses the optional `[store]` section.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the section is present but invalid.
    pub fn store(&self) -> Result<Option<StoreConfig>, SettingsError> {
        self.store
            .as_ref()
            .map(StoreConfig::from_config)
            .transpose()
            .map_err(SettingsError::from)
    }
}

fn flatten(
    config: &mut ConnectorConfig,
    prefix: &str,
    table: &toml::Table,
) -> Result<(), SettingsError> {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten(config, &key, nested)?,
            toml::Value::String(s) => config.set(key, s.clone()),
            toml::Value::Integer(i) => config.set(key, i.to_string()),
            toml::Value::Float(f) => config.set(key, f.to_string()),
            toml::Value::Boolean(b) => config.set(key, b.to_string()),
            toml::Value::Datetime(d) => config.set(key, d.to_string()),
            toml::Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        toml::Value::String(s) => parts.push(s.clone()),
                        toml::Value::Integer(_) | toml::Value::Float(_) | toml::Value::Boolean(_) => {
                            parts.push(item.to_string());
                        }
                        _ => {
                            return Err(SettingsError::InvalidValue {
                                key,
                                reason: "arrays may only hold scalars".into(),
                            })
                        }
                    }
                }
                config.set(key, parts.join(","));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE: &str = r#"
        [broker]
        "bootstrap.servers" = ["k1:9092", "k2:9092"]
        "group.id" = "courier-relay"
        "request.timeout.ms" = 5000

        [broker.kafka]
        "security.protocol" = "plaintext"

        [push]
        url = "ws://localhost:8090"
        namespace = "salon-7"
        "restores.subscriptions" = false

        [store]
        "base.url" = "http://localhost:3000/api"

        [unrelated]
        anything = 1
    "#;

    #[test]
    fn test_flattened_sections() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();

        let broker = settings.broker_section().unwrap();
        assert_eq!(broker.section(), "broker");
        assert_eq!(broker.get("bootstrap.servers"), Some("k1:9092,k2:9092"));
        assert_eq!(broker.get("request.timeout.ms"), Some("5000"));
        assert_eq!(broker.get("kafka.security.protocol"), Some("plaintext"));

        let broker = settings.broker().unwrap();
        assert_eq!(broker.request_timeout, Duration::from_secs(5));
        assert_eq!(
            broker.kafka_properties.get("security.protocol").map(String::as_str),
            Some("plaintext")
        );

        let push = settings.push().unwrap();
        assert_eq!(push.topic, "salon-7/notifications");

        let store = settings.store().unwrap().unwrap();
        assert_eq!(store.base_url, "http://localhost:3000/api");
    }

    #[test]
    fn test_missing_sections() {
        let settings = Settings::from_toml_str("[push]\nurl = \"ws://x\"\n").unwrap();
        assert!(matches!(
            settings.broker(),
            Err(SettingsError::MissingSection("broker"))
        ));
        assert!(settings.store().unwrap().is_none());
        assert!(settings.push().is_ok());
    }

    #[test]
    fn test_invalid_section_reports_key() {
        let settings = Settings::from_toml_str("[broker]\n\"group.id\" = \"g\"\n").unwrap();
        let err = settings.broker().unwrap_err();
        assert!(err.to_string().contains("broker.bootstrap.servers"), "{err}");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            Settings::from_toml_str("broker = 3"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            Settings::from_toml_str("[broker"),
            Err(SettingsError::Parse(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("[broker]\nlist = [{ a = 1 }]"),
            Err(SettingsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert!(settings.push_section().is_some());

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("courier.toml");
        assert!(matches!(
            Settings::load(&missing),
            Err(SettingsError::Io { .. })
        ));
    }
}
