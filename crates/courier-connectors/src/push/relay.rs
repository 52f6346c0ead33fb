//! Broker-to-transport relay.
//!
//! Consumes messages received from the broker, validates each one as a
//! notification event and republishes its canonical encoding on the push
//! topic. Nothing is buffered: events arriving while the transport is down
//! are dropped, and clients resync on reconnect.

use std::future::Future;
use std::sync::Arc;

use courier_core::{EventError, NotificationEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::transport::{PushTransport, TransportSignal};
use crate::broker::BrokerMessage;
use crate::metrics::BridgeMetrics;

/// Republishes broker events on a push transport topic.
pub struct Relay<T> {
    transport: T,
    topic: String,
    metrics: Arc<BridgeMetrics>,
    connected: bool,
}

impl<T: PushTransport> Relay<T> {
    /// Creates a relay publishing on `topic`.
    pub fn new(transport: T, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
            metrics: Arc::new(BridgeMetrics::new()),
            connected: false,
        }
    }

    /// Returns the relay counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs until `shutdown` resolves, the broker channel closes or the
    /// transport gives up. Always closes the transport before returning.
    pub async fn run<F>(mut self, mut messages: mpsc::Receiver<BrokerMessage>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(topic = %self.topic, "relay started");

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                signal = self.transport.next_signal() => match signal {
                    Some(signal) => self.track(signal),
                    None => {
                        warn!(topic = %self.topic, "push transport ended, stopping relay");
                        break;
                    }
                },
                msg = messages.recv() => match msg {
                    Some(msg) => self.relay(&msg).await,
                    None => {
                        info!(topic = %self.topic, "broker consumer stopped, stopping relay");
                        break;
                    }
                },
            }
        }

        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "failed to close push transport");
        }
        info!(topic = %self.topic, "relay stopped");
    }

    fn track(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Connected | TransportSignal::Reconnected => {
                info!(topic = %self.topic, "relay transport connected");
                self.connected = true;
            }
            TransportSignal::Disconnected(reason) => {
                warn!(topic = %self.topic, reason = %reason, "relay transport disconnected");
                self.metrics.record_disconnect();
                self.connected = false;
            }
            TransportSignal::Message { .. } => {}
        }
    }

    async fn relay(&mut self, msg: &BrokerMessage) {
        self.metrics.record_message();

        let event = match NotificationEvent::decode(&msg.payload) {
            Ok(event) => event,
            Err(EventError::UnknownAction(action)) => {
                warn!(offset = msg.offset, action = %action, "skipping event with unknown action");
                self.metrics.record_unknown_action();
                return;
            }
            Err(e) => {
                warn!(
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "skipping malformed broker message"
                );
                self.metrics.record_malformed();
                return;
            }
        };

        if !self.connected {
            warn!(id = %event.notification_id(), "transport down, dropping event");
            self.metrics.record_relay_failure();
            return;
        }

        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode event");
                self.metrics.record_relay_failure();
                return;
            }
        };

        match self.transport.publish(&self.topic, &payload).await {
            Ok(()) => {
                debug!(
                    topic = %self.topic,
                    action = %event.action(),
                    id = %event.notification_id(),
                    "relayed event"
                );
                self.metrics.record_dispatch();
            }
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "failed to relay event");
                self.metrics.record_relay_failure();
            }
        }
    }
}

impl<T> std::fmt::Debug for Relay<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("topic", &self.topic)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_event_payload, MockTransport};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn broker_message(payload: Vec<u8>) -> BrokerMessage {
        BrokerMessage::new("notification-events", payload)
    }

    #[tokio::test]
    async fn test_relays_valid_events() {
        let (transport, control) = MockTransport::new();
        let relay = Relay::new(transport, "courier/notifications");
        let metrics = relay.metrics();
        let (tx, rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(relay.run(rx, async move {
            let _ = stop_rx.await;
        }));

        control.signal(TransportSignal::Connected);
        tokio::time::sleep(Duration::from_millis(20)).await;

        tx.send(broker_message(b"garbage".to_vec())).await.unwrap();
        tx.send(broker_message(sample_event_payload("create", "n-1")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let published = control.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "courier/notifications");
        let event = NotificationEvent::decode(&published[0].1).unwrap();
        assert_eq!(event.notification_id(), "n-1");

        let snap = metrics.snapshot();
        assert_eq!(snap.malformed_dropped, 1);
        assert_eq!(snap.events_dispatched, 1);

        stop_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(control.is_closed());
    }

    #[tokio::test]
    async fn test_drops_while_disconnected() {
        let (transport, control) = MockTransport::new();
        let relay = Relay::new(transport, "t");
        let metrics = relay.metrics();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(relay.run(rx, std::future::pending()));

        tx.send(broker_message(sample_event_payload("create", "n-1")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(control.published().is_empty());
        assert_eq!(metrics.snapshot().relay_failures, 1);

        // Closing the broker side stops the relay.
        drop(tx);
        task.await.unwrap();
        assert!(control.is_closed());
    }
}
