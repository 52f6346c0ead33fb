//! Notification change events.
//!
//! Events travel between processes as JSON [`EventEnvelope`]s:
//!
//! ```text
//! { "action": "create" | "mark_read" | "mark_sent" | "delete",
//!   "notification": { ...Notification... },
//!   "was_read": bool?,    // delete only
//!   "was_sent": bool? }   // delete only
//! ```
//!
//! Inside a process they are the closed union [`NotificationEvent`]. The
//! conversion happens once, in [`NotificationEvent::decode`], which is where
//! malformed payloads and unknown actions are told apart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::Notification;

/// Errors produced while decoding an event payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The payload is not a well-formed event envelope.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// The envelope is well-formed but names an action this build does not know.
    #[error("unknown event action: '{0}'")]
    UnknownAction(String),
}

/// The change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// A notification was created.
    Create,
    /// A notification was read by its recipient.
    MarkRead,
    /// A notification was sent over its channel.
    MarkSent,
    /// A notification was deleted.
    Delete,
}

impl EventAction {
    /// Returns the wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Create => "create",
            EventAction::MarkRead => "mark_read",
            EventAction::MarkSent => "mark_sent",
            EventAction::Delete => "delete",
        }
    }
}

impl FromStr for EventAction {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventAction::Create),
            "mark_read" => Ok(EventAction::MarkRead),
            "mark_sent" => Ok(EventAction::MarkSent),
            "delete" => Ok(EventAction::Delete),
            other => Err(EventError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire form of a notification event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The change being described.
    pub action: EventAction,
    /// Notification payload (pre-deletion copy for `delete`).
    pub notification: Notification,
    /// Read flag before deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_read: Option<bool>,
    /// Sent flag before deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_sent: Option<bool>,
}

/// A validated notification event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// A notification was created.
    Create(Notification),
    /// A notification was marked read.
    MarkRead(Notification),
    /// A notification was marked sent.
    MarkSent(Notification),
    /// A notification was deleted.
    Delete {
        /// Last known copy of the deleted notification.
        notification: Notification,
        /// Whether it was read when deleted.
        was_read: bool,
        /// Whether it was sent when deleted.
        was_sent: bool,
    },
}

impl NotificationEvent {
    /// Builds a `delete` event, taking the pre-deletion flags from the payload.
    #[must_use]
    pub fn delete(notification: Notification) -> Self {
        let was_read = notification.read;
        let was_sent = notification.sent;
        NotificationEvent::Delete {
            notification,
            was_read,
            was_sent,
        }
    }

    /// Returns the action of this event.
    #[must_use]
    pub fn action(&self) -> EventAction {
        match self {
            NotificationEvent::Create(_) => EventAction::Create,
            NotificationEvent::MarkRead(_) => EventAction::MarkRead,
            NotificationEvent::MarkSent(_) => EventAction::MarkSent,
            NotificationEvent::Delete { .. } => EventAction::Delete,
        }
    }

    /// Returns the notification payload.
    #[must_use]
    pub fn notification(&self) -> &Notification {
        match self {
            NotificationEvent::Create(n)
            | NotificationEvent::MarkRead(n)
            | NotificationEvent::MarkSent(n) => n,
            NotificationEvent::Delete { notification, .. } => notification,
        }
    }

    /// Returns the id of the notification this event is about.
    #[must_use]
    pub fn notification_id(&self) -> &str {
        &self.notification().id
    }

    /// Decodes and validates a JSON payload.
    ///
    /// The action is checked before the payload shape so that a future
    /// action with an unfamiliar payload is reported as
    /// [`EventError::UnknownAction`] rather than as malformed.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] for invalid JSON, a missing or
    /// non-string `action`, a payload that does not match [`Notification`],
    /// or a payload that breaks the read/sent invariants.
    /// Returns [`EventError::UnknownAction`] for an unrecognized action.
    pub fn decode(payload: &[u8]) -> Result<Self, EventError> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| EventError::Malformed(format!("invalid JSON: {e}")))?;

        let action = value
            .get("action")
            .ok_or_else(|| EventError::Malformed("missing field 'action'".into()))?
            .as_str()
            .ok_or_else(|| EventError::Malformed("field 'action' must be a string".into()))?;
        action.parse::<EventAction>()?;

        let envelope: EventEnvelope = serde_json::from_value(value)
            .map_err(|e| EventError::Malformed(e.to_string()))?;
        Self::try_from(envelope)
    }

    /// Returns the wire envelope for this event.
    #[must_use]
    pub fn to_envelope(&self) -> EventEnvelope {
        let (was_read, was_sent) = match self {
            NotificationEvent::Delete {
                was_read, was_sent, ..
            } => (Some(*was_read), Some(*was_sent)),
            _ => (None, None),
        };
        EventEnvelope {
            action: self.action(),
            notification: self.notification().clone(),
            was_read,
            was_sent,
        }
    }

    /// Encodes the event as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(&self.to_envelope()).map_err(|e| EventError::Malformed(e.to_string()))
    }
}

impl TryFrom<EventEnvelope> for NotificationEvent {
    type Error = EventError;

    fn try_from(envelope: EventEnvelope) -> Result<Self, Self::Error> {
        envelope
            .notification
            .validate()
            .map_err(EventError::Malformed)?;

        let event = match envelope.action {
            EventAction::Create => NotificationEvent::Create(envelope.notification),
            EventAction::MarkRead => NotificationEvent::MarkRead(envelope.notification),
            EventAction::MarkSent => NotificationEvent::MarkSent(envelope.notification),
            EventAction::Delete => {
                // Older producers omit the flags; the payload still carries them.
                let was_read = envelope.was_read.unwrap_or(envelope.notification.read);
                let was_sent = envelope.was_sent.unwrap_or(envelope.notification.sent);
                NotificationEvent::Delete {
                    notification: envelope.notification,
                    was_read,
                    was_sent,
                }
            }
        };
        Ok(event)
    }
}
