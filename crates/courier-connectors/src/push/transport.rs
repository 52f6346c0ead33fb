//! Lightweight pub/sub transport abstraction.

use async_trait::async_trait;

use crate::error::ConnectorError;

/// Something that happened on the transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The first connection is established.
    Connected,
    /// The connection was re-established after a drop.
    Reconnected,
    /// A message arrived.
    Message {
        /// Topic the message was published on, if the transport reports it.
        topic: Option<String>,
        /// Raw payload bytes.
        payload: Vec<u8>,
    },
    /// The connection dropped; the transport is reconnecting.
    Disconnected(String),
}

/// A publish/subscribe connection to many passive listeners.
///
/// Reconnecting is the transport's job. Whether subscriptions survive a
/// reconnect is reported by [`PushTransport::restores_subscriptions`].
#[async_trait]
pub trait PushTransport: Send + 'static {
    /// Waits for the next signal. `None` once the transport has shut down
    /// for good.
    async fn next_signal(&mut self) -> Option<TransportSignal>;

    /// Subscribes to `topic` on the current connection.
    async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectorError>;

    /// Unsubscribes from `topic` on the current connection.
    async fn unsubscribe(&mut self, topic: &str) -> Result<(), ConnectorError>;

    /// Publishes a JSON payload on `topic`.
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ConnectorError>;

    /// Closes the connection and stops reconnecting.
    async fn close(&mut self) -> Result<(), ConnectorError>;

    /// Returns `true` if subscriptions survive a reconnect.
    fn restores_subscriptions(&self) -> bool;
}
