//! Notification record shape.
//!
//! The authoritative copy of a [`Notification`] lives in the external
//! notification store. The pipeline only carries its shape inside event
//! envelopes, so this module owns the serde mapping and the two flag
//! invariants (`read_at` iff `read`, `sent_at` iff `sent`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// A booking was created, moved or cancelled.
    Booking,
    /// Reminder for an upcoming appointment.
    Reminder,
    /// Marketing or promotional message.
    Promotion,
    /// System message (maintenance, policy changes).
    System,
    /// Message addressed to staff members.
    Staff,
}

impl NotificationKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Booking => "booking",
            NotificationKind::Reminder => "reminder",
            NotificationKind::Promotion => "promotion",
            NotificationKind::System => "system",
            NotificationKind::Staff => "staff",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery channel of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryChannel {
    /// Shown inside the application.
    #[default]
    #[serde(rename = "in-app")]
    InApp,
    /// Sent by e-mail.
    #[serde(rename = "email")]
    Email,
    /// Sent by text message.
    #[serde(rename = "sms")]
    Sms,
    /// Sent as a device push notification.
    #[serde(rename = "push")]
    Push,
}

impl DeliveryChannel {
    /// Returns the wire name of the channel.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::InApp => "in-app",
            DeliveryChannel::Email => "email",
            DeliveryChannel::Sms => "sms",
            DeliveryChannel::Push => "push",
        }
    }
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification as stored by the external notification store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Store-assigned identifier.
    pub id: String,
    /// User the notification is addressed to.
    pub recipient_id: String,
    /// What the notification is about.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Whether the recipient has read it.
    #[serde(default)]
    pub read: bool,
    /// When it was read. Set iff `read`.
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    /// Delivery channel.
    #[serde(default)]
    pub channel: DeliveryChannel,
    /// Planned delivery time, if scheduled.
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Whether it has been sent over its channel.
    #[serde(default)]
    pub sent: bool,
    /// When it was sent. Set iff `sent`.
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Creates an unread, unsent notification stamped with `now`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        recipient_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            recipient_id: recipient_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            read: false,
            read_at: None,
            channel: DeliveryChannel::InApp,
            scheduled_for: None,
            sent: false,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the notification read at `at`.
    pub fn mark_read(&mut self, at: DateTime<Utc>) {
        self.read = true;
        self.read_at = Some(at);
        self.updated_at = at;
    }

    /// Marks the notification sent at `at`.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.sent = true;
        self.sent_at = Some(at);
        self.updated_at = at;
    }

    /// Checks the flag/timestamp invariants.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("notification id cannot be empty".into());
        }
        if self.read != self.read_at.is_some() {
            return Err(format!(
                "notification {}: read={} but read_at is {}",
                self.id,
                self.read,
                presence(self.read_at.is_some())
            ));
        }
        if self.sent != self.sent_at.is_some() {
            return Err(format!(
                "notification {}: sent={} but sent_at is {}",
                self.id,
                self.sent,
                presence(self.sent_at.is_some())
            ));
        }
        Ok(())
    }
}

fn presence(set: bool) -> &'static str {
    if set {
        "set"
    } else {
        "null"
    }
}
