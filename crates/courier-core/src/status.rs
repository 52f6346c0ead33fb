//! Delivery status of a single notification.
//!
//! ```text
//! Created -> Pending -> Sent -> Read
//!               \_____________/^
//!   (any non-terminal) -> Deleted
//! ```

use std::fmt;

use crate::event::EventAction;
use crate::model::Notification;

/// Where a notification is in its delivery lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    /// Created by a server-side action, not yet enqueued.
    Created,
    /// Enqueued for delivery.
    Pending,
    /// Delivered over its channel.
    Sent,
    /// Read by the recipient.
    Read,
    /// Deleted. Terminal.
    Deleted,
}

/// A transition the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid delivery transition: {from} -> {to}")]
pub struct InvalidTransition {
    /// State before the attempted transition.
    pub from: DeliveryStatus,
    /// Requested state.
    pub to: DeliveryStatus,
}

impl DeliveryStatus {
    /// Derives the status from a stored notification's flags.
    #[must_use]
    pub fn of(notification: &Notification) -> Self {
        if notification.read {
            DeliveryStatus::Read
        } else if notification.sent {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Pending
        }
    }

    /// Returns `true` if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Deleted)
    }

    /// Returns `true` if `self -> to` is an allowed transition.
    #[must_use]
    pub fn can_transition_to(&self, to: DeliveryStatus) -> bool {
        use DeliveryStatus::{Created, Deleted, Pending, Read, Sent};
        matches!(
            (self, to),
            (Created, Pending) | (Pending, Sent) | (Sent, Read) | (Pending, Read)
        ) || (!self.is_terminal() && to == Deleted)
    }

    /// Moves to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the lifecycle forbids the move.
    pub fn transition(self, to: DeliveryStatus) -> Result<DeliveryStatus, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// Moves according to an event action.
    ///
    /// `create` enqueues a freshly created notification.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the action does not apply in the
    /// current state.
    pub fn on_action(self, action: EventAction) -> Result<DeliveryStatus, InvalidTransition> {
        let to = match action {
            EventAction::Create => DeliveryStatus::Pending,
            EventAction::MarkSent => DeliveryStatus::Sent,
            EventAction::MarkRead => DeliveryStatus::Read,
            EventAction::Delete => DeliveryStatus::Deleted,
        };
        self.transition(to)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Created => "Created",
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Sent => "Sent",
            DeliveryStatus::Read => "Read",
            DeliveryStatus::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::DeliveryStatus::{Created, Deleted, Pending, Read, Sent};
    use super::*;

    #[test]
    fn test_happy_path() {
        let s = Created
            .on_action(EventAction::Create)
            .and_then(|s| s.on_action(EventAction::MarkSent))
            .and_then(|s| s.on_action(EventAction::MarkRead))
            .unwrap();
        assert_eq!(s, Read);
    }

    #[test]
    fn test_read_before_send() {
        assert_eq!(Pending.transition(Read), Ok(Read));
    }

    #[test]
    fn test_any_state_can_be_deleted() {
        for s in [Created, Pending, Sent, Read] {
            assert_eq!(s.transition(Deleted), Ok(Deleted));
        }
    }

    #[test]
    fn test_deleted_is_terminal() {
        for to in [Created, Pending, Sent, Read, Deleted] {
            assert!(Deleted.transition(to).is_err());
        }
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(Created.transition(Sent).is_err());
        assert!(Read.transition(Sent).is_err());
        assert!(Sent.transition(Pending).is_err());
        let err = Read.on_action(EventAction::MarkSent).unwrap_err();
        assert_eq!(err.to_string(), "invalid delivery transition: Read -> Sent");
    }

    #[test]
    fn test_status_from_flags() {
        let now = chrono::DateTime::from_timestamp(0, 0).unwrap();
        let mut n = crate::model::Notification::new(
            "n",
            "u",
            crate::model::NotificationKind::System,
            "t",
            "m",
            now,
        );
        assert_eq!(DeliveryStatus::of(&n), Pending);
        n.mark_sent(now);
        assert_eq!(DeliveryStatus::of(&n), Sent);
        n.mark_read(now);
        assert_eq!(DeliveryStatus::of(&n), Read);
    }
}
