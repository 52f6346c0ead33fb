//! Broker client.
//!
//! [`BrokerClient`] owns one producer and one consumer session and tracks
//! their connection state independently. It never reconnects in the
//! background: a disconnected producer is reopened lazily, once, inside
//! [`BrokerClient::send`], and a failed consumer stays down until the next
//! [`BrokerClient::connect`].
//!
//! [`BrokerClient::disconnect`] advances a disconnect epoch. Sessions opened
//! under an older epoch are closed instead of installed, so a connect or
//! lazy reconnect still in flight cannot bring the client back up.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::NotificationEvent;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::BrokerConfig;
use super::session::{BrokerMessage, ConsumerSession, ProducerSession, Role, SessionFactory};
use crate::config::SessionState;
use crate::error::ConnectorError;
use crate::metrics::BrokerMetrics;
use crate::retry::with_retry_and_handler;

/// Connection status of a [`BrokerClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStatus {
    /// Whether the producer session is connected.
    pub producer: bool,
    /// Whether the consumer session is connected.
    pub consumer: bool,
    /// Configured broker address.
    pub broker_address: String,
}

struct RoleSlot<S: ?Sized> {
    state: SessionState,
    session: Option<Arc<S>>,
}

impl<S: ?Sized> Default for RoleSlot<S> {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            session: None,
        }
    }
}

impl<S: ?Sized> RoleSlot<S> {
    fn connected(&self) -> Option<Arc<S>> {
        if self.state.is_connected() {
            self.session.clone()
        } else {
            None
        }
    }

    fn set_connected(&mut self, session: Arc<S>) {
        self.session = Some(session);
        self.state = SessionState::Connected;
    }

    fn take(&mut self) -> Option<Arc<S>> {
        self.state = SessionState::Disconnected;
        self.session.take()
    }

    /// Drops `failed` if it is still the current session.
    fn drop_if_current(&mut self, failed: &Arc<S>) -> bool {
        match self.session {
            Some(ref current) if Arc::ptr_eq(current, failed) => {
                self.take();
                true
            }
            _ => false,
        }
    }
}

/// Closing shared by both session roles.
#[async_trait]
trait CloseSession: Send + Sync {
    async fn close_session(&self) -> Result<(), ConnectorError>;
}

#[async_trait]
impl CloseSession for dyn ProducerSession {
    async fn close_session(&self) -> Result<(), ConnectorError> {
        self.close().await
    }
}

#[async_trait]
impl CloseSession for dyn ConsumerSession {
    async fn close_session(&self) -> Result<(), ConnectorError> {
        self.close().await
    }
}

/// Durable publish/consume client.
///
/// Construct one per process and share it by reference (or `Arc`).
pub struct BrokerClient {
    config: BrokerConfig,
    factory: Arc<dyn SessionFactory>,
    producer: Mutex<RoleSlot<dyn ProducerSession>>,
    consumer: Mutex<RoleSlot<dyn ConsumerSession>>,
    /// Disconnect epoch; also wakes consumer loops on disconnect.
    epoch: watch::Sender<u64>,
    metrics: Arc<BrokerMetrics>,
}

impl BrokerClient {
    /// Creates a disconnected client that opens sessions through `factory`.
    #[must_use]
    pub fn new(config: BrokerConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            config,
            factory,
            producer: Mutex::new(RoleSlot::default()),
            consumer: Mutex::new(RoleSlot::default()),
            epoch,
            metrics: Arc::new(BrokerMetrics::new()),
        }
    }

    /// Creates a disconnected client backed by Kafka.
    #[cfg(feature = "kafka")]
    #[must_use]
    pub fn kafka(config: BrokerConfig) -> Self {
        Self::new(config, Arc::new(super::kafka::KafkaSessionFactory::new()))
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Returns the client metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<BrokerMetrics> {
        &self.metrics
    }

    /// Opens the producer, then the consumer.
    ///
    /// Each role is retried with exponential backoff independently of the
    /// other; a producer failure does not stop the consumer from
    /// connecting. Roles that are already connected are left alone.
    ///
    /// A [`BrokerClient::disconnect`] that lands while this is in flight
    /// wins: sessions opened afterwards are closed and both roles stay
    /// disconnected.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::BrokerConnection` for the first role that
    /// exhausted its retries (producer before consumer), or if the client
    /// was disconnected while connecting.
    pub async fn connect(&self) -> Result<(), ConnectorError> {
        info!(broker = %self.config.broker_address(), "connecting broker client");
        let epoch = self.current_epoch();

        let producer = self
            .open_role(Role::Producer, &self.producer, epoch, || {
                self.open_producer_once()
            })
            .await;
        let consumer = self
            .open_role(Role::Consumer, &self.consumer, epoch, || {
                self.open_consumer_once()
            })
            .await;

        producer.and(consumer)
    }

    /// Publishes `payload` on `topic`.
    ///
    /// If the producer is not connected, exactly one reconnect attempt is
    /// made first. Nothing is queued: if that attempt fails the message is
    /// not sent. A publish failure marks the producer disconnected.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::BrokerConnection` if the reconnect failed,
    /// or `ConnectorError::BrokerPublish` if the broker rejected the message.
    pub async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), ConnectorError> {
        let connected = self.producer.lock().connected();
        let session = match connected {
            Some(session) => session,
            None => self.reconnect_producer().await?,
        };

        match session.send(topic, key, payload).await {
            Ok(()) => {
                self.metrics.record_publish(payload.len() as u64);
                debug!(topic, bytes = payload.len(), "published message");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_publish_error();
                self.producer.lock().drop_if_current(&session);
                warn!(topic, error = %e, "publish failed, producer marked disconnected");
                Err(match e {
                    ConnectorError::BrokerPublish { .. } => e,
                    other => ConnectorError::BrokerPublish {
                        topic: topic.to_string(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Publishes a notification event on the configured topic, keyed by
    /// notification id.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Malformed` if the event cannot be encoded,
    /// otherwise the errors of [`BrokerClient::send`].
    pub async fn publish_event(&self, event: &NotificationEvent) -> Result<(), ConnectorError> {
        let payload = event.encode()?;
        self.send(&self.config.topic, Some(event.notification_id()), &payload)
            .await
    }

    /// Closes whichever sessions are open and stops the consumer loop.
    ///
    /// Idempotent: on a fully disconnected client this closes nothing.
    /// Connects and reconnects still in flight are abandoned. Close
    /// failures are logged, never returned.
    pub async fn disconnect(&self) {
        let (producer, consumer) = {
            let mut producer = self.producer.lock();
            let mut consumer = self.consumer.lock();
            self.epoch.send_modify(|epoch| *epoch += 1);
            (producer.take(), consumer.take())
        };
        if producer.is_none() && consumer.is_none() {
            debug!("broker client already disconnected");
            return;
        }

        if let Some(session) = producer {
            if let Err(e) = session.close().await {
                warn!(role = %Role::Producer, error = %e, "error closing broker session");
            }
        }
        if let Some(session) = consumer {
            if let Err(e) = session.close().await {
                warn!(role = %Role::Consumer, error = %e, "error closing broker session");
            }
        }
        info!(broker = %self.config.broker_address(), "broker client disconnected");
    }

    /// Returns the connection status without waiting on I/O.
    #[must_use]
    pub fn status(&self) -> BrokerStatus {
        BrokerStatus {
            producer: self.producer.lock().state.is_connected(),
            consumer: self.consumer.lock().state.is_connected(),
            broker_address: self.config.broker_address().to_string(),
        }
    }

    /// Returns the state of one role.
    #[must_use]
    pub fn role_state(&self, role: Role) -> SessionState {
        match role {
            Role::Producer => self.producer.lock().state,
            Role::Consumer => self.consumer.lock().state,
        }
    }

    /// Starts the consumer receive loop on its own task.
    ///
    /// Received messages are forwarded to `tx`. The loop ends on
    /// [`BrokerClient::disconnect`], when `tx` is closed, or on the first
    /// receive failure (which marks the consumer disconnected).
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::InvalidState` if the consumer is not connected.
    pub fn spawn_consumer(
        self: &Arc<Self>,
        tx: mpsc::Sender<BrokerMessage>,
    ) -> Result<JoinHandle<()>, ConnectorError> {
        let (session, epoch) = {
            let slot = self.consumer.lock();
            let session = slot.connected().ok_or_else(|| ConnectorError::InvalidState {
                expected: SessionState::Connected.to_string(),
                actual: slot.state.to_string(),
            })?;
            (session, self.current_epoch())
        };
        let shutdown = self.epoch.subscribe();
        let client = Arc::clone(self);

        Ok(tokio::spawn(async move {
            client.consume_loop(session, tx, epoch, shutdown).await;
        }))
    }

    async fn consume_loop(
        &self,
        session: Arc<dyn ConsumerSession>,
        tx: mpsc::Sender<BrokerMessage>,
        epoch: u64,
        mut shutdown: watch::Receiver<u64>,
    ) {
        info!(topic = %self.config.topic, "broker consumer loop started");
        loop {
            if *shutdown.borrow_and_update() != epoch {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                received = session.recv() => match received {
                    Ok(msg) => {
                        self.metrics.record_receive();
                        if tx.send(msg).await.is_err() {
                            debug!("consumer channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        self.metrics.record_receive_error();
                        self.consumer.lock().drop_if_current(&session);
                        warn!(error = %e, "broker receive failed, consumer marked disconnected");
                        break;
                    }
                },
            }
        }
        info!("broker consumer loop stopped");
    }

    fn current_epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    async fn open_role<S, F, Fut>(
        &self,
        role: Role,
        slot: &Mutex<RoleSlot<S>>,
        epoch: u64,
        open: F,
    ) -> Result<(), ConnectorError>
    where
        S: ?Sized + CloseSession,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Arc<S>, ConnectorError>>,
    {
        {
            let mut slot = slot.lock();
            if self.current_epoch() != epoch {
                return Err(disconnected_while_connecting(role));
            }
            if slot.state.is_connected() {
                debug!(role = %role, "broker session already connected");
                return Ok(());
            }
            slot.state = SessionState::Connecting;
        }

        let policy = self.config.retry_policy();
        let result = with_retry_and_handler(&policy, open, |attempt, e| {
            debug!(role = %role, attempt = attempt + 1, error = %e, "broker session attempt failed");
        })
        .await;

        match result {
            Ok(session) => {
                self.install(role, slot, epoch, session).await?;
                info!(role = %role, broker = %self.config.broker_address(), "broker session connected");
                Ok(())
            }
            Err(e) => {
                self.abandon(slot, epoch);
                self.metrics.record_connect_failure();
                warn!(
                    role = %role,
                    attempts = policy.max_attempts + 1,
                    error = %e,
                    "broker session retries exhausted"
                );
                Err(into_connection_error(role, e))
            }
        }
    }

    async fn reconnect_producer(&self) -> Result<Arc<dyn ProducerSession>, ConnectorError> {
        let epoch = {
            let mut slot = self.producer.lock();
            if let Some(session) = slot.connected() {
                return Ok(session);
            }
            slot.state = SessionState::Connecting;
            self.current_epoch()
        };
        info!(broker = %self.config.broker_address(), "producer disconnected, reconnecting before send");
        self.metrics.record_reconnect();

        match self.open_producer_once().await {
            Ok(session) => {
                let session = self
                    .install(Role::Producer, &self.producer, epoch, session)
                    .await?;
                info!("producer reconnected");
                Ok(session)
            }
            Err(e) => {
                self.abandon(&self.producer, epoch);
                self.metrics.record_connect_failure();
                warn!(error = %e, "producer reconnect failed, message not sent");
                Err(into_connection_error(Role::Producer, e))
            }
        }
    }

    /// Installs a freshly opened session and returns the one in use.
    ///
    /// The new session is closed instead if the client was disconnected
    /// since `epoch`, or if a concurrent caller already installed one.
    async fn install<S>(
        &self,
        role: Role,
        slot: &Mutex<RoleSlot<S>>,
        epoch: u64,
        session: Arc<S>,
    ) -> Result<Arc<S>, ConnectorError>
    where
        S: ?Sized + CloseSession,
    {
        let outcome = {
            let mut slot = slot.lock();
            if self.current_epoch() != epoch {
                Err(disconnected_while_connecting(role))
            } else if let Some(current) = slot.connected() {
                Ok(current)
            } else {
                slot.set_connected(Arc::clone(&session));
                Ok(Arc::clone(&session))
            }
        };

        let installed = matches!(outcome, Ok(ref current) if Arc::ptr_eq(current, &session));
        if !installed {
            debug!(role = %role, "closing surplus broker session");
            if let Err(e) = session.close_session().await {
                warn!(role = %role, error = %e, "error closing broker session");
            }
        }
        outcome
    }

    /// Marks a failed open, unless a disconnect or another open has since
    /// moved the slot on.
    fn abandon<S: ?Sized>(&self, slot: &Mutex<RoleSlot<S>>, epoch: u64) {
        let mut slot = slot.lock();
        if self.current_epoch() == epoch && slot.state == SessionState::Connecting {
            slot.state = SessionState::Disconnected;
        }
    }

    async fn open_producer_once(&self) -> Result<Arc<dyn ProducerSession>, ConnectorError> {
        self.metrics.record_connect_attempt();
        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, self.factory.open_producer(&self.config)).await {
            Ok(result) => result.map(Arc::from),
            Err(_) => Err(ConnectorError::Timeout(as_millis(timeout))),
        }
    }

    async fn open_consumer_once(&self) -> Result<Arc<dyn ConsumerSession>, ConnectorError> {
        self.metrics.record_connect_attempt();
        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, self.factory.open_consumer(&self.config)).await {
            Ok(result) => result.map(Arc::from),
            Err(_) => Err(ConnectorError::Timeout(as_millis(timeout))),
        }
    }
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("broker", &self.config.broker_address())
            .field("topic", &self.config.topic)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn disconnected_while_connecting(role: Role) -> ConnectorError {
    ConnectorError::BrokerConnection {
        role: role.to_string(),
        reason: "client disconnected while connecting".into(),
    }
}

fn into_connection_error(role: Role, e: ConnectorError) -> ConnectorError {
    match e {
        ConnectorError::BrokerConnection { .. } => e,
        other => ConnectorError::BrokerConnection {
            role: role.to_string(),
            reason: other.to_string(),
        },
    }
}

#[allow(clippy::cast_possible_truncation)] // timeouts are far below u64::MAX ms
fn as_millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
