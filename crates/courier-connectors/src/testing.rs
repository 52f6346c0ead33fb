//! Testing utilities for broker, push and handler code.
//!
//! Provides scripted mock broker sessions, a channel-driven mock push
//! transport, a recording event handler and payload helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::{Notification, NotificationEvent, NotificationKind};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::broker::{BrokerConfig, BrokerMessage, ConsumerSession, ProducerSession, SessionFactory};
use crate::error::ConnectorError;
use crate::push::{EventHandler, PushTransport, TransportSignal};

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

/// Fixed timestamp used by the helpers.
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_714_550_400, 0).unwrap_or_default()
}

/// Creates an unread, unsent booking notification for recipient `u1`.
#[must_use]
pub fn sample_notification(id: &str) -> Notification {
    Notification::new(
        id,
        "u1",
        NotificationKind::Booking,
        "Booking confirmed",
        "See you at 10:00",
        fixed_time(),
    )
}

/// Builds a JSON event payload for `action` about notification `id`.
///
/// The notification flags match the action (`mark_read` yields a read
/// notification, `mark_sent` a sent one). `action` is written verbatim, so
/// unknown actions can be produced too.
#[must_use]
pub fn sample_event_payload(action: &str, id: &str) -> Vec<u8> {
    let mut notification = sample_notification(id);
    match action {
        "mark_read" => notification.mark_read(fixed_time()),
        "mark_sent" => notification.mark_sent(fixed_time()),
        _ => {}
    }
    let value = serde_json::json!({
        "action": action,
        "notification": notification,
    });
    value.to_string().into_bytes()
}

// ---------------------------------------------------------------------------
// MockSessionFactory
// ---------------------------------------------------------------------------

/// A message accepted by a mock producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    /// Target topic.
    pub topic: String,
    /// Message key.
    pub key: Option<String>,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

type Delivery = Result<BrokerMessage, ConnectorError>;

#[derive(Default)]
struct MockBrokerState {
    producer_opens: AtomicUsize,
    consumer_opens: AtomicUsize,
    failing_producer_opens: AtomicUsize,
    failing_consumer_opens: AtomicUsize,
    producer_unavailable: AtomicBool,
    consumer_unavailable: AtomicBool,
    open_delay_ms: AtomicU64,
    fail_next_publish: AtomicBool,
    published: Mutex<Vec<PublishedRecord>>,
    producer_closes: AtomicUsize,
    consumer_closes: AtomicUsize,
}

/// Session factory with scripted failures and in-memory delivery.
pub struct MockSessionFactory {
    state: Arc<MockBrokerState>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    inbox: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>>,
}

impl MockSessionFactory {
    /// Creates a factory whose sessions always open.
    #[must_use]
    pub fn new() -> Self {
        let (deliveries, inbox) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(MockBrokerState::default()),
            deliveries,
            inbox: Arc::new(tokio::sync::Mutex::new(inbox)),
        }
    }

    /// Number of producer open attempts so far.
    #[must_use]
    pub fn producer_opens(&self) -> usize {
        self.state.producer_opens.load(Ordering::SeqCst)
    }

    /// Number of consumer open attempts so far.
    #[must_use]
    pub fn consumer_opens(&self) -> usize {
        self.state.consumer_opens.load(Ordering::SeqCst)
    }

    /// Number of producer sessions closed so far.
    #[must_use]
    pub fn producer_closes(&self) -> usize {
        self.state.producer_closes.load(Ordering::SeqCst)
    }

    /// Number of consumer sessions closed so far.
    #[must_use]
    pub fn consumer_closes(&self) -> usize {
        self.state.consumer_closes.load(Ordering::SeqCst)
    }

    /// Fails the next `n` producer opens.
    pub fn fail_next_producer_opens(&self, n: usize) {
        self.state.failing_producer_opens.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` consumer opens.
    pub fn fail_next_consumer_opens(&self, n: usize) {
        self.state.failing_consumer_opens.store(n, Ordering::SeqCst);
    }

    /// Fails every producer open while `unavailable` is set.
    pub fn set_producer_unavailable(&self, unavailable: bool) {
        self.state
            .producer_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    /// Fails every consumer open while `unavailable` is set.
    pub fn set_consumer_unavailable(&self, unavailable: bool) {
        self.state
            .consumer_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    /// Delays every open by `delay`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_open_delay(&self, delay: Duration) {
        self.state
            .open_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fails the next publish on any producer session.
    pub fn fail_next_publish(&self) {
        self.state.fail_next_publish.store(true, Ordering::SeqCst);
    }

    /// Returns every message accepted so far.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedRecord> {
        self.state.published.lock().clone()
    }

    /// Queues a message for the consumer.
    pub fn deliver(&self, msg: BrokerMessage) {
        let _ = self.deliveries.send(Ok(msg));
    }

    /// Makes the next consumer receive fail.
    pub fn fail_next_receive(&self) {
        let _ = self
            .deliveries
            .send(Err(ConnectorError::BrokerReceive("mock receive failure".into())));
    }

    async fn open_delay(&self) {
        let ms = self.state.open_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

impl Default for MockSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn unavailable(role: &str) -> ConnectorError {
    ConnectorError::BrokerConnection {
        role: role.to_string(),
        reason: "mock broker unavailable".into(),
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open_producer(
        &self,
        _config: &BrokerConfig,
    ) -> Result<Box<dyn ProducerSession>, ConnectorError> {
        self.state.producer_opens.fetch_add(1, Ordering::SeqCst);
        self.open_delay().await;
        if self.state.producer_unavailable.load(Ordering::SeqCst)
            || take_failure(&self.state.failing_producer_opens)
        {
            return Err(unavailable("producer"));
        }
        Ok(Box::new(MockProducerSession {
            state: Arc::clone(&self.state),
        }))
    }

    async fn open_consumer(
        &self,
        _config: &BrokerConfig,
    ) -> Result<Box<dyn ConsumerSession>, ConnectorError> {
        self.state.consumer_opens.fetch_add(1, Ordering::SeqCst);
        self.open_delay().await;
        if self.state.consumer_unavailable.load(Ordering::SeqCst)
            || take_failure(&self.state.failing_consumer_opens)
        {
            return Err(unavailable("consumer"));
        }
        Ok(Box::new(MockConsumerSession {
            state: Arc::clone(&self.state),
            inbox: Arc::clone(&self.inbox),
        }))
    }
}

struct MockProducerSession {
    state: Arc<MockBrokerState>,
}

#[async_trait]
impl ProducerSession for MockProducerSession {
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), ConnectorError> {
        if self.state.fail_next_publish.swap(false, Ordering::SeqCst) {
            return Err(ConnectorError::BrokerPublish {
                topic: topic.to_string(),
                reason: "mock publish failure".into(),
            });
        }
        self.state.published.lock().push(PublishedRecord {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        self.state.producer_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockConsumerSession {
    state: Arc<MockBrokerState>,
    inbox: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>>,
}

#[async_trait]
impl ConsumerSession for MockConsumerSession {
    async fn recv(&self) -> Result<BrokerMessage, ConnectorError> {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some(delivery) => delivery,
            None => Err(ConnectorError::Closed),
        }
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        self.state.consumer_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TransportLog {
    subscriptions: Mutex<Vec<String>>,
    unsubscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    subscribe_failures: AtomicUsize,
    closed: AtomicBool,
}

/// Push transport driven by a [`MockTransportControl`].
pub struct MockTransport {
    signals: mpsc::UnboundedReceiver<TransportSignal>,
    log: Arc<TransportLog>,
    restores_subscriptions: bool,
}

/// Test-side handle of a [`MockTransport`].
#[derive(Clone)]
pub struct MockTransportControl {
    signals: Arc<Mutex<Option<mpsc::UnboundedSender<TransportSignal>>>>,
    log: Arc<TransportLog>,
}

impl MockTransport {
    /// Creates a transport and its control handle.
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, MockTransportControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Arc::new(TransportLog::default());
        (
            Self {
                signals: rx,
                log: Arc::clone(&log),
                restores_subscriptions: false,
            },
            MockTransportControl {
                signals: Arc::new(Mutex::new(Some(tx))),
                log,
            },
        )
    }

    /// Sets whether subscriptions survive a reconnect.
    pub fn set_restores_subscriptions(&mut self, restores: bool) {
        self.restores_subscriptions = restores;
    }
}

impl MockTransportControl {
    /// Emits a transport signal.
    pub fn signal(&self, signal: TransportSignal) {
        if let Some(tx) = self.signals.lock().as_ref() {
            let _ = tx.send(signal);
        }
    }

    /// Emits a message on `topic`.
    pub fn message(&self, topic: &str, payload: &[u8]) {
        self.signal(TransportSignal::Message {
            topic: Some(topic.to_string()),
            payload: payload.to_vec(),
        });
    }

    /// Emits a message without topic information.
    pub fn untopiced_message(&self, payload: &[u8]) {
        self.signal(TransportSignal::Message {
            topic: None,
            payload: payload.to_vec(),
        });
    }

    /// Ends the signal stream, as a transport that gave up reconnecting.
    pub fn end(&self) {
        self.signals.lock().take();
    }

    /// Fails the next `n` subscribe requests.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.log.subscribe_failures.store(n, Ordering::SeqCst);
    }

    /// Topics subscribed so far, in order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.log.subscriptions.lock().clone()
    }

    /// Topics unsubscribed so far, in order.
    #[must_use]
    pub fn unsubscriptions(&self) -> Vec<String> {
        self.log.unsubscriptions.lock().clone()
    }

    /// Published `(topic, payload)` pairs.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.log.published.lock().clone()
    }

    /// Returns `true` once the transport was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.log.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn next_signal(&mut self) -> Option<TransportSignal> {
        self.signals.recv().await
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectorError> {
        if take_failure(&self.log.subscribe_failures) {
            return Err(ConnectorError::Transport("mock subscribe failure".into()));
        }
        self.log.subscriptions.lock().push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), ConnectorError> {
        self.log.unsubscriptions.lock().push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ConnectorError> {
        self.log
            .published
            .lock()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.log.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn restores_subscriptions(&self) -> bool {
        self.restores_subscriptions
    }
}

// ---------------------------------------------------------------------------
// RecordingHandler
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Recording {
    events: Mutex<VecDeque<NotificationEvent>>,
    errors: Mutex<Vec<String>>,
    reconnects: AtomicUsize,
    complete: AtomicBool,
}

/// Event handler that records everything it is given.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    inner: Arc<Recording>,
}

impl RecordingHandler {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.inner.events.lock().iter().cloned().collect()
    }

    /// Errors reported so far.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.inner.errors.lock().clone()
    }

    /// Number of reconnect notifications.
    #[must_use]
    pub fn reconnects(&self) -> usize {
        self.inner.reconnects.load(Ordering::SeqCst)
    }

    /// Returns `true` once the subscription completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.inner.complete.load(Ordering::SeqCst)
    }
}

impl EventHandler for RecordingHandler {
    fn on_event(&self, event: NotificationEvent) {
        self.inner.events.lock().push_back(event);
    }

    fn on_error(&self, error: &ConnectorError) {
        self.inner.errors.lock().push(error.to_string());
    }

    fn on_reconnect(&self) {
        self.inner.reconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_complete(&self) {
        self.inner.complete.store(true, Ordering::SeqCst);
    }
}
