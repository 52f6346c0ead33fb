//! # Courier Connectors
//!
//! Network plumbing for the Courier notification pipeline.
//!
//! ## Components
//!
//! - [`broker`] - Durable broker client (Kafka sessions, lazy reconnect)
//! - [`push`] - Lightweight push transport, bridge and relay
//! - [`store`] - REST client for the notification store
//! - [`testing`] - Mock sessions, mock transport and a recording handler
//!
//! ## Architecture
//!
//! ```text
//! store write ─> BrokerClient::publish_event ─> broker topic
//!                                                   │
//!                              BrokerClient::spawn_consumer
//!                                                   │
//!                                   Relay ─publish─> push topic
//!                                                   │
//!                    PushBridge::subscribe ─> EventHandler (StatsReconciler, feed)
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Common test patterns that are acceptable
#![cfg_attr(
    test,
    allow(
        clippy::field_reassign_with_default,
        clippy::manual_let_else,
        clippy::cast_possible_truncation,
        clippy::no_effect_underscore_binding,
        unused_mut
    )
)]

// ── Foundation ──

/// Connector error types.
pub mod error;

/// Connector configuration types.
pub mod config;

/// Connector health status types.
pub mod health;

/// Connector metrics types.
pub mod metrics;

/// Retry policy with exponential backoff.
pub mod retry;

/// Testing utilities (mock sessions, mock transport, helpers).
pub mod testing;

// ── Pipeline ──

/// Durable broker client.
pub mod broker;

/// Lightweight push transport, bridge and relay.
pub mod push;

/// Notification store REST client.
pub mod store;

pub use config::{ConnectorConfig, SessionState};
pub use error::{ConnectorError, MalformedEventError};
pub use health::HealthStatus;
