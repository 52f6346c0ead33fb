//! WebSocket push transport.
//!
//! Control frames are JSON text messages tagged by `type`:
//!
//! ```text
//! client -> server  {"type":"subscribe","topic":"courier/notifications"}
//!                   {"type":"unsubscribe","topic":"courier/notifications"}
//!                   {"type":"publish","topic":"...","payload":{...}}
//! server -> client  {"type":"message","topic":"...","payload":{...}}
//! ```
//!
//! A text message that is not a frame is delivered as-is with no topic.
//! The connection is driven by a background task that reconnects with
//! exponential backoff. Subscriptions are not restored by the server, so
//! the task only reports [`TransportSignal::Reconnected`] and leaves
//! re-subscribing to the caller.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::config::PushConfig;
use super::transport::{PushTransport, TransportSignal};
use crate::error::ConnectorError;
use crate::retry::RetryPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A WebSocket control frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Start receiving messages for `topic`.
    Subscribe {
        /// Topic name.
        topic: String,
    },
    /// Stop receiving messages for `topic`.
    Unsubscribe {
        /// Topic name.
        topic: String,
    },
    /// Publish `payload` to every subscriber of `topic`.
    Publish {
        /// Topic name.
        topic: String,
        /// JSON payload.
        payload: serde_json::Value,
    },
    /// A message delivered to a subscriber.
    Message {
        /// Topic name.
        topic: String,
        /// JSON payload.
        payload: serde_json::Value,
    },
}

enum Command {
    Send {
        frame: Frame,
        ack: oneshot::Sender<Result<(), ConnectorError>>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

enum PumpExit {
    Closed,
    Dropped(String),
}

/// WebSocket implementation of [`PushTransport`].
pub struct WebSocketTransport {
    url: String,
    commands: mpsc::Sender<Command>,
    signals: mpsc::UnboundedReceiver<TransportSignal>,
    task: Option<JoinHandle<()>>,
    restores_subscriptions: bool,
}

impl WebSocketTransport {
    /// Starts connecting to `config.url` in the background.
    ///
    /// Must be called from within a tokio runtime. The first successful
    /// connection is reported as [`TransportSignal::Connected`].
    #[must_use]
    pub fn connect(config: &PushConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(32);
        let (signal_tx, signals) = mpsc::unbounded_channel();
        let task = tokio::spawn(connection_task(
            config.url.clone(),
            config.reconnect_policy(),
            command_rx,
            signal_tx,
        ));

        Self {
            url: config.url.clone(),
            commands,
            signals,
            task: Some(task),
            restores_subscriptions: config.restores_subscriptions,
        }
    }

    async fn request(&self, frame: Frame) -> Result<(), ConnectorError> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(Command::Send { frame, ack })
            .await
            .map_err(|_| ConnectorError::Closed)?;
        rx.await.map_err(|_| ConnectorError::Closed)?
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url)
            .field("restores_subscriptions", &self.restores_subscriptions)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn next_signal(&mut self) -> Option<TransportSignal> {
        self.signals.recv().await
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectorError> {
        self.request(Frame::Subscribe {
            topic: topic.to_string(),
        })
        .await
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), ConnectorError> {
        self.request(Frame::Unsubscribe {
            topic: topic.to_string(),
        })
        .await
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ConnectorError> {
        let payload: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| ConnectorError::Transport(format!("payload is not JSON: {e}")))?;
        self.request(Frame::Publish {
            topic: topic.to_string(),
            payload,
        })
        .await
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        let (ack, rx) = oneshot::channel();
        if self.commands.send(Command::Close { ack }).await.is_ok() {
            let _ = rx.await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!(url = %self.url, "websocket transport closed");
        Ok(())
    }

    fn restores_subscriptions(&self) -> bool {
        self.restores_subscriptions
    }
}

async fn connection_task(
    url: String,
    policy: RetryPolicy,
    mut commands: mpsc::Receiver<Command>,
    signals: mpsc::UnboundedSender<TransportSignal>,
) {
    let mut connected_before = false;
    let mut attempt = 0usize;

    loop {
        let connected = tokio::select! {
            result = connect_async(url.as_str()) => result,
            cmd = commands.recv() => {
                if reject_while_disconnected(cmd) {
                    continue;
                }
                return;
            }
        };

        match connected {
            Ok((ws, _response)) => {
                attempt = 0;
                let signal = if connected_before {
                    info!(url = %url, "websocket reconnected");
                    TransportSignal::Reconnected
                } else {
                    info!(url = %url, "websocket connected");
                    TransportSignal::Connected
                };
                connected_before = true;
                if signals.send(signal).is_err() {
                    return;
                }

                match pump(ws, &mut commands, &signals).await {
                    PumpExit::Closed => return,
                    PumpExit::Dropped(reason) => {
                        warn!(url = %url, reason = %reason, "websocket connection dropped");
                        if signals.send(TransportSignal::Disconnected(reason)).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                debug!(url = %url, attempt, error = %e, "websocket connect failed");
            }
        }

        if !policy.should_retry(attempt) {
            warn!(url = %url, attempts = attempt + 1, "websocket reconnect attempts exhausted");
            let _ = signals.send(TransportSignal::Disconnected(
                "reconnect attempts exhausted".into(),
            ));
            return;
        }
        attempt += 1;

        let sleep = tokio::time::sleep(policy.delay_for_attempt(attempt));
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => break,
                cmd = commands.recv() => {
                    if !reject_while_disconnected(cmd) {
                        return;
                    }
                }
            }
        }
    }
}

/// Answers a command that arrived with no open connection.
///
/// Returns `false` if the transport should stop.
fn reject_while_disconnected(cmd: Option<Command>) -> bool {
    match cmd {
        Some(Command::Send { ack, .. }) => {
            let _ = ack.send(Err(ConnectorError::Transport("not connected".into())));
            true
        }
        Some(Command::Close { ack }) => {
            let _ = ack.send(());
            false
        }
        None => false,
    }
}

async fn pump(
    ws: WsStream,
    commands: &mut mpsc::Receiver<Command>,
    signals: &mpsc::UnboundedSender<TransportSignal>,
) -> PumpExit {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if signals.send(parse_inbound(text.as_str())).is_err() {
                        return PumpExit::Closed;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let signal = TransportSignal::Message {
                        topic: None,
                        payload: bytes.to_vec(),
                    };
                    if signals.send(signal).is_err() {
                        return PumpExit::Closed;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    return PumpExit::Dropped("connection closed by server".into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpExit::Dropped(e.to_string()),
                None => return PumpExit::Dropped("stream ended".into()),
            },
            cmd = commands.recv() => match cmd {
                Some(Command::Send { frame, ack }) => {
                    let result = match serde_json::to_string(&frame) {
                        Ok(json) => write
                            .send(Message::Text(json.into()))
                            .await
                            .map_err(|e| ConnectorError::Transport(e.to_string())),
                        Err(e) => Err(ConnectorError::Transport(e.to_string())),
                    };
                    let failed = result.is_err();
                    let _ = ack.send(result);
                    if failed {
                        return PumpExit::Dropped("write failed".into());
                    }
                }
                Some(Command::Close { ack }) => {
                    let _ = write.send(Message::Close(None)).await;
                    let _ = ack.send(());
                    return PumpExit::Closed;
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return PumpExit::Closed;
                }
            }
        }
    }
}

fn parse_inbound(text: &str) -> TransportSignal {
    match serde_json::from_str::<Frame>(text) {
        Ok(Frame::Message { topic, payload } | Frame::Publish { topic, payload }) => {
            TransportSignal::Message {
                topic: Some(topic),
                payload: payload_bytes(payload),
            }
        }
        _ => TransportSignal::Message {
            topic: None,
            payload: text.as_bytes().to_vec(),
        },
    }
}

fn payload_bytes(payload: serde_json::Value) -> Vec<u8> {
    match payload {
        serde_json::Value::String(s) => s.into_bytes(),
        other => other.to_string().into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_wire_format() {
        let json = serde_json::to_value(Frame::Subscribe {
            topic: "courier/notifications".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "subscribe", "topic": "courier/notifications" })
        );
    }

    #[test]
    fn test_parse_message_frame() {
        let text = r#"{"type":"message","topic":"a/notifications","payload":{"action":"create"}}"#;
        match parse_inbound(text) {
            TransportSignal::Message { topic, payload } => {
                assert_eq!(topic.as_deref(), Some("a/notifications"));
                let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
                assert_eq!(value["action"], "create");
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }

    #[test]
    fn test_parse_string_payload() {
        let text = r#"{"type":"message","topic":"t","payload":"{\"action\":\"delete\"}"}"#;
        match parse_inbound(text) {
            TransportSignal::Message { payload, .. } => {
                assert_eq!(payload, br#"{"action":"delete"}"#);
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }

    #[test]
    fn test_parse_bare_text() {
        match parse_inbound("not a frame") {
            TransportSignal::Message { topic, payload } => {
                assert!(topic.is_none());
                assert_eq!(payload, b"not a frame");
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }
}
