//! # Courier Core
//!
//! Transport-independent pieces of the Courier notification pipeline.
//!
//! This crate provides:
//! - **Model**: the [`Notification`] record and its flag invariants
//! - **Events**: the closed [`NotificationEvent`] union and its JSON envelope
//! - **Stats**: the incremental [`StatsAggregate`] fold and [`StatsReconciler`]
//! - **Feed**: the newest-first [`NotificationFeed`] shown to a client
//! - **Status**: the per-notification [`DeliveryStatus`] lifecycle
//!
//! Nothing here performs I/O. Broker, push and store plumbing lives in
//! `courier-connectors`.
//!
//! ## Example
//!
//! ```rust
//! use courier_core::{NotificationEvent, StatsReconciler};
//!
//! let reconciler = StatsReconciler::new();
//! let payload = br#"{"action":"archive","notification":{}}"#;
//! // Unknown actions are logged and ignored.
//! assert!(reconciler.ingest(payload).is_empty());
//! assert!(NotificationEvent::decode(payload).is_err());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod event;
pub mod feed;
pub mod model;
pub mod stats;
pub mod status;

pub use event::{EventAction, EventEnvelope, EventError, NotificationEvent};
pub use feed::{NotificationFeed, DEFAULT_FEED_CAPACITY};
pub use model::{DeliveryChannel, Notification, NotificationKind};
pub use stats::{ReconcilerMetrics, StatsAggregate, StatsReconciler};
pub use status::{DeliveryStatus, InvalidTransition};

/// Result type for courier-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for courier-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Event decoding errors
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// Delivery lifecycle errors
    #[error("Status error: {0}")]
    Status(#[from] InvalidTransition),
}
