//! Connector metrics types.
//!
//! Provides lock-free counters for the pipeline connectors:
//! - `BrokerMetrics`: Tracked by the broker client
//! - `BridgeMetrics`: Tracked by push bridge subscriptions and the relay

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics tracked by a broker client.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    /// Session open attempts, across both roles.
    pub connect_attempts: AtomicU64,

    /// Session opens that exhausted their retries.
    pub connect_failures: AtomicU64,

    /// Lazy reconnects performed inside `send`.
    pub reconnects: AtomicU64,

    /// Messages published.
    pub messages_published: AtomicU64,

    /// Payload bytes published.
    pub bytes_published: AtomicU64,

    /// Publish failures.
    pub publish_errors: AtomicU64,

    /// Messages received by the consumer loop.
    pub messages_received: AtomicU64,

    /// Consumer receive failures.
    pub receive_errors: AtomicU64,
}

impl BrokerMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a session open attempt.
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a session open that gave up.
    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lazy reconnect.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful publish.
    pub fn record_publish(&self, bytes: u64) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_published.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a failed publish.
    pub fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a received message.
    pub fn record_receive(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a receive failure.
    pub fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> BrokerMetricsSnapshot {
        BrokerMetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of broker metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerMetricsSnapshot {
    /// Session open attempts.
    pub connect_attempts: u64,
    /// Session opens that gave up.
    pub connect_failures: u64,
    /// Lazy reconnects.
    pub reconnects: u64,
    /// Messages published.
    pub messages_published: u64,
    /// Payload bytes published.
    pub bytes_published: u64,
    /// Publish failures.
    pub publish_errors: u64,
    /// Messages received.
    pub messages_received: u64,
    /// Receive failures.
    pub receive_errors: u64,
}

/// Metrics tracked by push bridge subscriptions and the relay.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    /// Messages received from the transport.
    pub messages_received: AtomicU64,

    /// Events handed to a handler, or republished by the relay.
    pub events_dispatched: AtomicU64,

    /// Payloads dropped because they failed to decode.
    pub malformed_dropped: AtomicU64,

    /// Well-formed payloads dropped because of an unknown action.
    pub unknown_actions: AtomicU64,

    /// Handler panics caught.
    pub handler_panics: AtomicU64,

    /// Subscriptions re-issued after a transport reconnect.
    pub resubscriptions: AtomicU64,

    /// Transport disconnects observed.
    pub disconnects: AtomicU64,

    /// Relay republishes that the transport rejected.
    pub relay_failures: AtomicU64,
}

impl BridgeMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an inbound transport message.
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dispatched event.
    pub fn record_dispatch(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dropped malformed payload.
    pub fn record_malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dropped unknown action.
    pub fn record_unknown_action(&self) {
        self.unknown_actions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a caught handler panic.
    pub fn record_handler_panic(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a re-issued subscription.
    pub fn record_resubscription(&self) {
        self.resubscriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a transport disconnect.
    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rejected relay republish.
    pub fn record_relay_failure(&self) {
        self.relay_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> BridgeMetricsSnapshot {
        BridgeMetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            unknown_actions: self.unknown_actions.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            resubscriptions: self.resubscriptions.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            relay_failures: self.relay_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of bridge metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeMetricsSnapshot {
    /// Messages received.
    pub messages_received: u64,
    /// Events dispatched.
    pub events_dispatched: u64,
    /// Malformed payloads dropped.
    pub malformed_dropped: u64,
    /// Unknown actions dropped.
    pub unknown_actions: u64,
    /// Handler panics caught.
    pub handler_panics: u64,
    /// Subscriptions re-issued.
    pub resubscriptions: u64,
    /// Transport disconnects.
    pub disconnects: u64,
    /// Relay republishes rejected.
    pub relay_failures: u64,
}
