//! Lightweight push delivery.
//!
//! ```text
//! broker ──> Relay ──publish──> transport topic ──> PushBridge ──> EventHandler
//! ```
//!
//! # Module Structure
//!
//! - `config` - Transport endpoint, topic naming and reconnect settings
//! - `transport` - The `PushTransport` trait and its signals
//! - `websocket` - WebSocket transport with automatic reconnect
//! - `bridge` - Subscriptions that decode events and call handlers
//! - `relay` - Republishes broker events on the push topic

pub mod bridge;
pub mod config;
pub mod relay;
pub mod transport;
pub mod websocket;

pub use bridge::{EventHandler, PushBridge, SubscriptionHandle, SubscriptionState};
pub use config::{notifications_topic, PushConfig, DEFAULT_NAMESPACE};
pub use relay::Relay;
pub use transport::{PushTransport, TransportSignal};
pub use websocket::{Frame, WebSocketTransport};
