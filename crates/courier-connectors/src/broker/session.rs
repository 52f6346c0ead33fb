//! Broker session traits.
//!
//! A session is one open connection for one role. [`BrokerClient`] owns
//! the sessions and their state; a [`SessionFactory`] only knows how to
//! open them, which keeps the client testable without a running broker.
//!
//! [`BrokerClient`]: super::BrokerClient

use std::fmt;

use async_trait::async_trait;

use super::config::BrokerConfig;
use crate::error::ConnectorError;

/// The two independently tracked session roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Publishing session.
    Producer,
    /// Consuming session.
    Consumer,
}

impl Role {
    /// Returns the role name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Topic the message was read from.
    pub topic: String,
    /// Message key, if any.
    pub key: Option<String>,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Partition the message was read from.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
}

impl BrokerMessage {
    /// Creates a message with no key at partition 0, offset 0.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: payload.into(),
            partition: 0,
            offset: 0,
        }
    }
}

/// An open producer session.
#[async_trait]
pub trait ProducerSession: Send + Sync {
    /// Publishes one message and waits for the broker acknowledgment.
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), ConnectorError>;

    /// Flushes and closes the session.
    async fn close(&self) -> Result<(), ConnectorError>;
}

/// An open consumer session.
#[async_trait]
pub trait ConsumerSession: Send + Sync {
    /// Waits for the next message.
    async fn recv(&self) -> Result<BrokerMessage, ConnectorError>;

    /// Leaves the group and closes the session.
    async fn close(&self) -> Result<(), ConnectorError>;
}

/// Opens broker sessions.
///
/// Each call makes exactly one attempt; retry and timeouts are applied by
/// the caller.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a producer session.
    async fn open_producer(
        &self,
        config: &BrokerConfig,
    ) -> Result<Box<dyn ProducerSession>, ConnectorError>;

    /// Opens a consumer session subscribed to `config.topic`.
    async fn open_consumer(
        &self,
        config: &BrokerConfig,
    ) -> Result<Box<dyn ConsumerSession>, ConnectorError>;
}
