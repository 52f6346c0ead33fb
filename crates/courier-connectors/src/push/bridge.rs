//! Push bridge: [`EventHandler`] trait, [`PushBridge`] and [`SubscriptionHandle`].
//!
//! A subscription owns one transport connection and runs a single receive
//! loop on a dedicated tokio task. Every inbound message is decoded into a
//! [`NotificationEvent`] and handed to the handler in arrival order.
//!
//! # Panic Safety
//!
//! Panics in [`EventHandler::on_event`] are caught via
//! [`std::panic::catch_unwind`] and forwarded to
//! [`EventHandler::on_error`] as [`ConnectorError::Handler`]. The loop keeps
//! running.
//!
//! # Lifecycle
//!
//! [`SubscriptionHandle::unsubscribe`] stops the loop and waits for teardown
//! (unsubscribe, close the transport, [`EventHandler::on_complete`]).
//! Dropping the handle requests the same teardown without waiting for it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use courier_core::{EventError, NotificationEvent};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::PushConfig;
use super::transport::{PushTransport, TransportSignal};
use crate::error::ConnectorError;
use crate::health::HealthStatus;
use crate::metrics::BridgeMetrics;

// ---------------------------------------------------------------------------
// EventHandler
// ---------------------------------------------------------------------------

/// Receives decoded notification events from a subscription.
///
/// Calls are sequential: the next event is not delivered until `on_event`
/// returns.
///
/// # Example
///
/// ```rust,ignore
/// struct Counter(AtomicU64);
///
/// impl EventHandler for Counter {
///     fn on_event(&self, _event: NotificationEvent) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync + 'static {
    /// Called once for every well-formed event received.
    fn on_event(&self, event: NotificationEvent);

    /// Called when the handler panicked or the transport rejected a request.
    ///
    /// Default implementation logs the error via `tracing::warn!`.
    fn on_error(&self, error: &ConnectorError) {
        warn!(error = %error, "push subscription error");
    }

    /// Called after the transport reconnected and the subscription is live
    /// again. Events published while disconnected are lost.
    fn on_reconnect(&self) {}

    /// Called once when the subscription has been torn down.
    fn on_complete(&self) {}
}

/// Adapter that wraps a closure into an [`EventHandler`].
struct FnHandler<F>(F);

impl<F: Fn(NotificationEvent) + Send + Sync + 'static> EventHandler for FnHandler<F> {
    fn on_event(&self, event: NotificationEvent) {
        (self.0)(event);
    }
}

impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    fn on_event(&self, event: NotificationEvent) {
        (**self).on_event(event);
    }

    fn on_error(&self, error: &ConnectorError) {
        (**self).on_error(error);
    }

    fn on_reconnect(&self) {
        (**self).on_reconnect();
    }

    fn on_complete(&self) {
        (**self).on_complete();
    }
}

// ---------------------------------------------------------------------------
// SubscriptionState
// ---------------------------------------------------------------------------

/// Observable state of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Waiting for the transport to connect.
    Connecting,
    /// Subscribed and receiving.
    Subscribed,
    /// The transport dropped; waiting for it to reconnect.
    Disconnected(String),
    /// Torn down.
    Closed,
}

impl SubscriptionState {
    /// Maps the state onto a health status.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        match self {
            SubscriptionState::Connecting => HealthStatus::Unknown,
            SubscriptionState::Subscribed => HealthStatus::Healthy,
            SubscriptionState::Disconnected(reason) => {
                HealthStatus::Degraded(format!("push transport disconnected: {reason}"))
            }
            SubscriptionState::Closed => HealthStatus::Unhealthy("subscription closed".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// PushBridge
// ---------------------------------------------------------------------------

/// Bridges a push transport to local event handlers.
#[derive(Debug, Clone)]
pub struct PushBridge {
    config: PushConfig,
    metrics: Arc<BridgeMetrics>,
}

impl PushBridge {
    /// Creates a bridge.
    #[must_use]
    pub fn new(config: PushConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(BridgeMetrics::new()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Returns the shared bridge counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Subscribes `handler` to `topic` over `transport`.
    ///
    /// The subscription request is issued when the transport reports it is
    /// connected, and re-issued after every reconnect unless the transport
    /// restores subscriptions itself. Must be called from within a tokio
    /// runtime.
    pub fn subscribe<T, H>(
        &self,
        transport: T,
        topic: impl Into<String>,
        handler: H,
    ) -> SubscriptionHandle
    where
        T: PushTransport,
        H: EventHandler,
    {
        let topic = topic.into();
        let state = Arc::new(Mutex::new(SubscriptionState::Connecting));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let runner = Runner {
            transport,
            topic: topic.clone(),
            handler,
            state: Arc::clone(&state),
            metrics: Arc::clone(&self.metrics),
            accept_unknown_actions: self.config.accept_unknown_actions,
        };
        let task = tokio::spawn(runner.run(shutdown_rx));

        SubscriptionHandle {
            topic,
            state,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Subscribes a closure to `topic` over `transport`.
    pub fn subscribe_fn<T, F>(
        &self,
        transport: T,
        topic: impl Into<String>,
        f: F,
    ) -> SubscriptionHandle
    where
        T: PushTransport,
        F: Fn(NotificationEvent) + Send + Sync + 'static,
    {
        self.subscribe(transport, topic, FnHandler(f))
    }
}

// ---------------------------------------------------------------------------
// SubscriptionHandle
// ---------------------------------------------------------------------------

/// Handle to a running subscription.
///
/// Dropping the handle tears the subscription down in the background.
pub struct SubscriptionHandle {
    topic: String,
    state: Arc<Mutex<SubscriptionState>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Returns the subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.state.lock().clone()
    }

    /// Returns the health of this subscription.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        self.state.lock().health()
    }

    /// Returns `true` once the receive loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the subscription and waits for teardown to complete.
    pub async fn unsubscribe(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(topic = %self.topic, error = %e, "push subscription task failed");
            }
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("topic", &self.topic)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

// ---------------------------------------------------------------------------
// Runner (internal)
// ---------------------------------------------------------------------------

struct Runner<T, H> {
    transport: T,
    topic: String,
    handler: H,
    state: Arc<Mutex<SubscriptionState>>,
    metrics: Arc<BridgeMetrics>,
    accept_unknown_actions: bool,
}

impl<T: PushTransport, H: EventHandler> Runner<T, H> {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        loop {
            let signal = tokio::select! {
                _ = &mut shutdown => break,
                signal = self.transport.next_signal() => signal,
            };

            match signal {
                Some(TransportSignal::Connected) => self.issue_subscribe(false).await,
                Some(TransportSignal::Reconnected) => {
                    if self.transport.restores_subscriptions() {
                        debug!(topic = %self.topic, "transport restored subscription");
                        self.set_state(SubscriptionState::Subscribed);
                    } else {
                        self.issue_subscribe(true).await;
                    }
                    self.handler.on_reconnect();
                }
                Some(TransportSignal::Disconnected(reason)) => {
                    warn!(topic = %self.topic, reason = %reason, "push transport disconnected");
                    self.metrics.record_disconnect();
                    self.set_state(SubscriptionState::Disconnected(reason));
                }
                Some(TransportSignal::Message { topic, payload }) => {
                    if topic.as_deref().is_some_and(|t| t != self.topic) {
                        debug!(topic = ?topic, "ignoring message for another topic");
                        continue;
                    }
                    self.dispatch(&payload);
                }
                None => {
                    debug!(topic = %self.topic, "push transport ended");
                    break;
                }
            }
        }

        self.teardown().await;
    }

    async fn issue_subscribe(&mut self, resubscribe: bool) {
        match self.transport.subscribe(&self.topic).await {
            Ok(()) => {
                if resubscribe {
                    self.metrics.record_resubscription();
                    info!(topic = %self.topic, "re-subscribed after reconnect");
                } else {
                    info!(topic = %self.topic, "subscribed");
                }
                self.set_state(SubscriptionState::Subscribed);
            }
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "subscribe failed");
                self.set_state(SubscriptionState::Disconnected(e.to_string()));
                self.handler.on_error(&e);
            }
        }
    }

    fn dispatch(&self, payload: &[u8]) {
        self.metrics.record_message();

        let event = match NotificationEvent::decode(payload) {
            Ok(event) => event,
            Err(EventError::UnknownAction(action)) if self.accept_unknown_actions => {
                warn!(topic = %self.topic, action = %action, "ignoring event with unknown action");
                self.metrics.record_unknown_action();
                return;
            }
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "dropping malformed event payload");
                self.metrics.record_malformed();
                return;
            }
        };

        let handler = &self.handler;
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler.on_event(event)));
        match result {
            Ok(()) => self.metrics.record_dispatch(),
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    format!("handler panicked: {s}")
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    format!("handler panicked: {s}")
                } else {
                    "handler panicked".to_string()
                };
                self.metrics.record_handler_panic();
                self.handler.on_error(&ConnectorError::Handler(msg));
            }
        }
    }

    async fn teardown(&mut self) {
        let subscribed = *self.state.lock() == SubscriptionState::Subscribed;
        if subscribed {
            if let Err(e) = self.transport.unsubscribe(&self.topic).await {
                debug!(topic = %self.topic, error = %e, "unsubscribe failed during teardown");
            }
        }
        if let Err(e) = self.transport.close().await {
            warn!(topic = %self.topic, error = %e, "failed to close push transport");
        }
        self.set_state(SubscriptionState::Closed);
        self.handler.on_complete();
        info!(topic = %self.topic, "push subscription closed");
    }

    fn set_state(&self, state: SubscriptionState) {
        *self.state.lock() = state;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_event_payload, MockTransport, RecordingHandler};
    use std::time::Duration;

    fn bridge() -> PushBridge {
        PushBridge::new(PushConfig::new("ws://localhost:8090"))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_subscribes_on_connected() {
        let (transport, control) = MockTransport::new();
        let handler = RecordingHandler::new();
        let handle = bridge().subscribe(transport, "courier/notifications", handler.clone());

        assert_eq!(handle.state(), SubscriptionState::Connecting);
        control.signal(TransportSignal::Connected);
        settle().await;

        assert_eq!(control.subscriptions(), vec!["courier/notifications"]);
        assert_eq!(handle.state(), SubscriptionState::Subscribed);
        assert!(handle.health().is_healthy());
    }

    #[tokio::test]
    async fn test_malformed_then_valid_dispatches_once() {
        let (transport, control) = MockTransport::new();
        let handler = RecordingHandler::new();
        let bridge = bridge();
        let metrics = bridge.metrics();
        let _handle = bridge.subscribe(transport, "courier/notifications", handler.clone());

        control.signal(TransportSignal::Connected);
        control.message("courier/notifications", b"{not json");
        control.message("courier/notifications", &sample_event_payload("create", "n-1"));
        settle().await;

        let events = handler.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].notification_id(), "n-1");

        let snap = metrics.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.malformed_dropped, 1);
        assert_eq!(snap.events_dispatched, 1);
    }

    #[tokio::test]
    async fn test_duplicates_are_delivered() {
        let (transport, control) = MockTransport::new();
        let handler = RecordingHandler::new();
        let _handle = bridge().subscribe(transport, "courier/notifications", handler.clone());

        control.signal(TransportSignal::Connected);
        let payload = sample_event_payload("mark_read", "n-1");
        control.message("courier/notifications", &payload);
        control.message("courier/notifications", &payload);
        settle().await;

        assert_eq!(handler.events().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_action_handling() {
        let payload = sample_event_payload("archive", "n-1");

        let (transport, control) = MockTransport::new();
        let strict = bridge();
        let _strict_handle = strict.subscribe(transport, "t", RecordingHandler::new());
        control.signal(TransportSignal::Connected);
        control.message("t", &payload);

        let mut config = PushConfig::new("ws://localhost:8090");
        config.accept_unknown_actions = true;
        let lenient = PushBridge::new(config);
        let (transport, control) = MockTransport::new();
        let _lenient_handle = lenient.subscribe(transport, "t", RecordingHandler::new());
        control.signal(TransportSignal::Connected);
        control.message("t", &payload);
        settle().await;

        assert_eq!(strict.metrics().snapshot().malformed_dropped, 1);
        assert_eq!(strict.metrics().snapshot().unknown_actions, 0);
        assert_eq!(lenient.metrics().snapshot().malformed_dropped, 0);
        assert_eq!(lenient.metrics().snapshot().unknown_actions, 1);
    }

    #[tokio::test]
    async fn test_other_topics_ignored() {
        let (transport, control) = MockTransport::new();
        let handler = RecordingHandler::new();
        let _handle = bridge().subscribe(transport, "a/notifications", handler.clone());

        control.signal(TransportSignal::Connected);
        control.message("b/notifications", &sample_event_payload("create", "n-1"));
        control.untopiced_message(&sample_event_payload("create", "n-2"));
        settle().await;

        let events = handler.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].notification_id(), "n-2");
    }

    #[tokio::test]
    async fn test_resubscribes_after_reconnect() {
        let (transport, control) = MockTransport::new();
        let handler = RecordingHandler::new();
        let bridge = bridge();
        let handle = bridge.subscribe(transport, "courier/notifications", handler.clone());

        control.signal(TransportSignal::Connected);
        control.signal(TransportSignal::Disconnected("reset".into()));
        settle().await;
        assert!(matches!(handle.state(), SubscriptionState::Disconnected(_)));

        control.signal(TransportSignal::Reconnected);
        settle().await;

        assert_eq!(control.subscriptions().len(), 2);
        assert_eq!(handle.state(), SubscriptionState::Subscribed);
        assert_eq!(handler.reconnects(), 1);
        assert_eq!(bridge.metrics().snapshot().resubscriptions, 1);
    }

    #[tokio::test]
    async fn test_no_resubscribe_when_transport_restores() {
        let (mut transport, control) = MockTransport::new();
        transport.set_restores_subscriptions(true);
        let handler = RecordingHandler::new();
        let _handle = bridge().subscribe(transport, "t", handler.clone());

        control.signal(TransportSignal::Connected);
        control.signal(TransportSignal::Reconnected);
        settle().await;

        assert_eq!(control.subscriptions().len(), 1);
        assert_eq!(handler.reconnects(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_failure_reported() {
        let (transport, control) = MockTransport::new();
        control.fail_next_subscribes(1);
        let handler = RecordingHandler::new();
        let handle = bridge().subscribe(transport, "t", handler.clone());

        control.signal(TransportSignal::Connected);
        settle().await;
        assert!(matches!(handle.state(), SubscriptionState::Disconnected(_)));
        assert_eq!(handler.errors().len(), 1);

        control.signal(TransportSignal::Reconnected);
        settle().await;
        assert_eq!(handle.state(), SubscriptionState::Subscribed);
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let (transport, control) = MockTransport::new();
        let bridge = bridge();
        let handle = bridge.subscribe_fn(transport, "t", |event| {
            assert_ne!(event.notification_id(), "boom", "poisoned event");
        });

        control.signal(TransportSignal::Connected);
        control.message("t", &sample_event_payload("create", "boom"));
        control.message("t", &sample_event_payload("create", "ok"));
        settle().await;

        let snap = bridge.metrics().snapshot();
        assert_eq!(snap.handler_panics, 1);
        assert_eq!(snap.events_dispatched, 1);
        assert!(!handle.is_finished());
    }

    #[tokio::test]
    async fn test_unsubscribe_tears_down() {
        let (transport, control) = MockTransport::new();
        let handler = RecordingHandler::new();
        let handle = bridge().subscribe(transport, "t", handler.clone());

        control.signal(TransportSignal::Connected);
        settle().await;
        handle.unsubscribe().await;

        assert_eq!(control.unsubscriptions(), vec!["t"]);
        assert!(control.is_closed());
        assert!(handler.is_complete());
    }

    #[tokio::test]
    async fn test_drop_tears_down() {
        let (transport, control) = MockTransport::new();
        let handler = RecordingHandler::new();
        let handle = bridge().subscribe(transport, "t", handler.clone());

        control.signal(TransportSignal::Connected);
        settle().await;
        drop(handle);
        settle().await;

        assert!(control.is_closed());
        assert!(handler.is_complete());
    }

    #[tokio::test]
    async fn test_transport_end_completes() {
        let (transport, control) = MockTransport::new();
        let handler = RecordingHandler::new();
        let handle = bridge().subscribe(transport, "t", handler.clone());

        control.end();
        settle().await;

        assert!(handle.is_finished());
        assert_eq!(handle.state(), SubscriptionState::Closed);
        assert!(!handle.health().is_operational());
        assert!(handler.is_complete());
        // Never subscribed, so nothing to unsubscribe.
        assert!(control.unsubscriptions().is_empty());
    }
}
