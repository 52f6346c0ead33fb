//! Durable message broker client.
//!
//! ```text
//! BrokerClient ── SessionFactory ──> ProducerSession  (send)
//!                                └─> ConsumerSession  (recv loop -> mpsc)
//! ```
//!
//! # Module Structure
//!
//! - `config` - Broker configuration and rdkafka property mapping
//! - `session` - Session traits and received message type
//! - `kafka` - rdkafka-backed sessions
//! - `client` - Connection state, lazy reconnect, publish and consume

pub mod client;
pub mod config;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod session;

pub use client::{BrokerClient, BrokerStatus};
pub use config::{BrokerConfig, DEFAULT_EVENTS_TOPIC};
#[cfg(feature = "kafka")]
pub use kafka::KafkaSessionFactory;
pub use session::{BrokerMessage, ConsumerSession, ProducerSession, Role, SessionFactory};
