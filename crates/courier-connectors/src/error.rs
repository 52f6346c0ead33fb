//! Connector error types.
//!
//! Provides a unified error hierarchy for all connector operations:
//! - `ConnectorError`: Top-level error for broker, push and store operations
//! - `MalformedEventError`: An inbound payload that is not a valid event
//!
//! The retry contract is carried by [`ConnectorError::is_retryable`], so
//! callers never need to inspect error text to decide whether to try again.

use courier_core::EventError;
use thiserror::Error;

/// Errors that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Connecting a broker session exhausted its retries.
    #[error("broker connection failed ({role}): {reason}")]
    BrokerConnection {
        /// Session role (`producer` or `consumer`).
        role: String,
        /// Last failure observed.
        reason: String,
    },

    /// Publishing on a connected producer failed.
    #[error("broker publish to '{topic}' failed: {reason}")]
    BrokerPublish {
        /// Target topic.
        topic: String,
        /// Broker-reported failure.
        reason: String,
    },

    /// Receiving on a connected consumer failed.
    #[error("broker receive failed: {0}")]
    BrokerReceive(String),

    /// The push transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The notification store answered with an error or could not be reached.
    #[error("store request failed ({status}): {message}")]
    Store {
        /// HTTP status code, `0` if no response was received.
        status: u16,
        /// Response body or transport error.
        message: String,
    },

    /// An event handler panicked.
    #[error("event handler failed: {0}")]
    Handler(String),

    /// Invalid connector configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Required configuration key is missing.
    #[error("missing required config: {0}")]
    MissingConfig(String),

    /// Operation timed out.
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// The connector has been closed.
    #[error("connector closed")]
    Closed,

    /// The connector is not in the expected state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// The expected state.
        expected: String,
        /// The actual state.
        actual: String,
    },

    /// An inbound payload is not a valid event.
    #[error(transparent)]
    Malformed(#[from] MalformedEventError),
}

impl ConnectorError {
    /// Returns `true` if repeating the failed call is safe and may succeed.
    ///
    /// Publish failures and timeouts are transient. Exhausted connection
    /// retries, configuration problems and malformed payloads will fail the
    /// same way again. Store errors are retryable for 5xx and transport
    /// failures only.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectorError::BrokerPublish { .. }
            | ConnectorError::BrokerReceive(_)
            | ConnectorError::Timeout(_) => true,
            ConnectorError::Store { status, .. } => *status == 0 || *status >= 500,
            _ => false,
        }
    }
}

/// An inbound payload that failed to decode as a notification event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed event: {reason}")]
pub struct MalformedEventError {
    /// Why decoding failed.
    pub reason: String,
}

impl MalformedEventError {
    /// Creates a new malformed-event error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<EventError> for MalformedEventError {
    fn from(e: EventError) -> Self {
        match e {
            EventError::Malformed(reason) => Self { reason },
            EventError::UnknownAction(action) => Self {
                reason: format!("unknown action '{action}'"),
            },
        }
    }
}

impl From<EventError> for ConnectorError {
    fn from(e: EventError) -> Self {
        ConnectorError::Malformed(e.into())
    }
}
