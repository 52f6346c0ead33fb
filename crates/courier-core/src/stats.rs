//! Incremental notification statistics.
//!
//! [`apply`] is a pure fold step over [`NotificationEvent`]s and [`resync`]
//! replaces the folded value with an authoritative snapshot. Every counter
//! decrement saturates at zero, so no event sequence can drive a field
//! negative. Duplicated or missed events make the fold drift from the store
//! until the next resync; that drift is accepted.
//!
//! [`StatsReconciler`] wraps the fold for callers that share one aggregate:
//! both operations run under the same lock, so a resync is never observed
//! half-applied.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::{EventError, NotificationEvent};

/// Aggregate notification counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatsAggregate {
    /// Notifications that exist.
    pub total: u64,
    /// Notifications not yet read.
    pub unread: u64,
    /// Notifications sent over their channel.
    pub sent: u64,
    /// Notifications not yet sent.
    pub pending: u64,
    /// Notifications read.
    pub read: u64,
}

impl StatsAggregate {
    /// Creates an aggregate from explicit counts.
    #[must_use]
    pub const fn new(total: u64, unread: u64, sent: u64, pending: u64, read: u64) -> Self {
        Self {
            total,
            unread,
            sent,
            pending,
            read,
        }
    }

    /// Returns `true` if every counter is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Folds one event into `state`.
///
/// | action    | total | unread          | pending         | sent          | read          |
/// |-----------|-------|-----------------|-----------------|---------------|---------------|
/// | create    | +1    | +1              | +1              |               |               |
/// | mark_read |       | -1              |                 |               | +1            |
/// | mark_sent |       |                 | -1              | +1            |               |
/// | delete    | -1    | -1 if !was_read | -1 if !was_sent | -1 if was_sent| -1 if was_read|
///
/// Every decrement saturates at zero.
#[must_use]
pub fn apply(state: StatsAggregate, event: &NotificationEvent) -> StatsAggregate {
    let mut next = state;
    match event {
        NotificationEvent::Create(_) => {
            next.total += 1;
            next.unread += 1;
            next.pending += 1;
        }
        NotificationEvent::MarkRead(_) => {
            next.unread = next.unread.saturating_sub(1);
            next.read += 1;
        }
        NotificationEvent::MarkSent(_) => {
            next.pending = next.pending.saturating_sub(1);
            next.sent += 1;
        }
        NotificationEvent::Delete {
            was_read, was_sent, ..
        } => {
            next.total = next.total.saturating_sub(1);
            if *was_read {
                next.read = next.read.saturating_sub(1);
            } else {
                next.unread = next.unread.saturating_sub(1);
            }
            if *was_sent {
                next.sent = next.sent.saturating_sub(1);
            } else {
                next.pending = next.pending.saturating_sub(1);
            }
        }
    }
    next
}

/// Replaces `state` with the authoritative snapshot.
///
/// Nothing from `state` survives.
#[must_use]
pub fn resync(state: StatsAggregate, authoritative: StatsAggregate) -> StatsAggregate {
    let _ = state;
    authoritative
}

/// Point-in-time counters of a [`StatsReconciler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerMetrics {
    /// Events folded into the aggregate.
    pub events_applied: u64,
    /// Payloads dropped as malformed or unknown.
    pub events_ignored: u64,
    /// Resyncs performed.
    pub resyncs: u64,
}

/// Shared owner of a [`StatsAggregate`].
#[derive(Debug, Default)]
pub struct StatsReconciler {
    state: Mutex<StatsAggregate>,
    events_applied: AtomicU64,
    events_ignored: AtomicU64,
    resyncs: AtomicU64,
}

impl StatsReconciler {
    /// Creates a reconciler starting from all-zero counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reconciler seeded with `initial`.
    #[must_use]
    pub fn with_initial(initial: StatsAggregate) -> Self {
        Self {
            state: Mutex::new(initial),
            ..Self::default()
        }
    }

    /// Returns the current aggregate.
    #[must_use]
    pub fn snapshot(&self) -> StatsAggregate {
        *self.state.lock()
    }

    /// Folds `event` into the aggregate and returns the new value.
    pub fn apply(&self, event: &NotificationEvent) -> StatsAggregate {
        let mut state = self.state.lock();
        *state = apply(*state, event);
        self.events_applied.fetch_add(1, Ordering::Relaxed);
        *state
    }

    /// Replaces the aggregate with `authoritative` and returns it.
    pub fn resync(&self, authoritative: StatsAggregate) -> StatsAggregate {
        let mut state = self.state.lock();
        let before = *state;
        *state = resync(before, authoritative);
        self.resyncs.fetch_add(1, Ordering::Relaxed);
        debug!(?before, after = ?authoritative, "stats resynced");
        *state
    }

    /// Decodes a raw payload and folds it in.
    ///
    /// Malformed payloads and unknown actions are logged and leave the
    /// aggregate untouched. Returns the aggregate after the call.
    pub fn ingest(&self, payload: &[u8]) -> StatsAggregate {
        match NotificationEvent::decode(payload) {
            Ok(event) => self.apply(&event),
            Err(EventError::UnknownAction(action)) => {
                self.events_ignored.fetch_add(1, Ordering::Relaxed);
                warn!(action = %action, "ignoring event with unknown action");
                self.snapshot()
            }
            Err(e) => {
                self.events_ignored.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "ignoring malformed event");
                self.snapshot()
            }
        }
    }

    /// Returns the reconciler counters.
    #[must_use]
    pub fn metrics(&self) -> ReconcilerMetrics {
        ReconcilerMetrics {
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::DateTime;

    use super::*;
    use crate::model::{Notification, NotificationKind};

    fn note(id: &str) -> Notification {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Notification::new(id, "u1", NotificationKind::Booking, "t", "m", now)
    }

    fn delete(id: &str, was_read: bool, was_sent: bool) -> NotificationEvent {
        NotificationEvent::Delete {
            notification: note(id),
            was_read,
            was_sent,
        }
    }

    fn fold(events: &[NotificationEvent]) -> StatsAggregate {
        events
            .iter()
            .fold(StatsAggregate::default(), |s, e| apply(s, e))
    }

    #[test]
    fn test_create_increments() {
        let s = apply(StatsAggregate::default(), &NotificationEvent::Create(note("a")));
        assert_eq!(s, StatsAggregate::new(1, 1, 0, 1, 0));
    }

    #[test]
    fn test_full_lifecycle_returns_to_zero() {
        let s = fold(&[
            NotificationEvent::Create(note("a")),
            NotificationEvent::MarkRead(note("a")),
            NotificationEvent::MarkSent(note("a")),
            delete("a", true, true),
        ]);
        assert_eq!(s, StatsAggregate::default());
    }

    #[test]
    fn test_delete_unread_unsent() {
        let s = fold(&[NotificationEvent::Create(note("a")), delete("a", false, false)]);
        assert!(s.is_empty());
    }

    #[test]
    fn test_delete_read_but_unsent() {
        let s = fold(&[
            NotificationEvent::Create(note("a")),
            NotificationEvent::MarkRead(note("a")),
            delete("a", true, false),
        ]);
        assert!(s.is_empty());
    }

    #[test]
    fn test_decrements_clamp_at_zero() {
        let s = fold(&[
            NotificationEvent::MarkRead(note("a")),
            NotificationEvent::MarkSent(note("a")),
            delete("a", false, false),
            delete("b", true, true),
        ]);
        // read and sent were bumped once each, then removed by the second delete.
        assert_eq!(s, StatsAggregate::default());
    }

    #[test]
    fn test_out_of_order_never_negative() {
        let events = [
            delete("a", true, false),
            NotificationEvent::MarkRead(note("a")),
            delete("a", false, true),
            NotificationEvent::Create(note("a")),
            delete("a", false, false),
            delete("a", false, false),
            NotificationEvent::MarkSent(note("a")),
        ];
        let mut s = StatsAggregate::default();
        for e in &events {
            let prev_total = s.total;
            s = apply(s, e);
            // u64 fields cannot go negative; check nothing wrapped around.
            assert!(s.total <= prev_total + 1);
            assert!(s.unread < u64::MAX / 2 && s.pending < u64::MAX / 2);
            assert!(s.sent < u64::MAX / 2 && s.read < u64::MAX / 2);
        }
    }

    #[test]
    fn test_duplicate_create_drifts_until_resync() {
        let dup = NotificationEvent::Create(note("same-id"));
        let s = fold(&[dup.clone(), dup]);
        assert_eq!(s.total, 2);

        let fixed = resync(s, StatsAggregate::new(1, 1, 0, 1, 0));
        assert_eq!(fixed.total, 1);
    }

    #[test]
    fn test_resync_overwrites_drift() {
        let drifted = StatsAggregate::new(40, 7, 3, 37, 33);
        let clean = StatsAggregate::default();
        let authoritative = StatsAggregate::new(2, 1, 1, 1, 1);
        let event = NotificationEvent::MarkRead(note("x"));

        assert_eq!(
            apply(resync(drifted, authoritative), &event),
            apply(resync(clean, authoritative), &event)
        );
    }

    #[test]
    fn test_reconciler_apply_and_resync() {
        let r = StatsReconciler::new();
        r.apply(&NotificationEvent::Create(note("a")));
        r.apply(&NotificationEvent::Create(note("a")));
        assert_eq!(r.snapshot().total, 2);

        r.resync(StatsAggregate::new(1, 1, 0, 1, 0));
        assert_eq!(r.snapshot().total, 1);

        let m = r.metrics();
        assert_eq!(m.events_applied, 2);
        assert_eq!(m.resyncs, 1);
    }

    #[test]
    fn test_reconciler_ingest_absorbs_bad_payloads() {
        let r = StatsReconciler::with_initial(StatsAggregate::new(3, 3, 0, 3, 0));
        let unknown = serde_json::json!({ "action": "archive", "notification": note("a") });

        assert_eq!(r.ingest(b"garbage"), StatsAggregate::new(3, 3, 0, 3, 0));
        assert_eq!(
            r.ingest(unknown.to_string().as_bytes()),
            StatsAggregate::new(3, 3, 0, 3, 0)
        );
        assert_eq!(r.metrics().events_ignored, 2);

        let create = NotificationEvent::Create(note("b")).encode().unwrap();
        assert_eq!(r.ingest(&create).total, 4);
    }

    #[test]
    fn test_resync_is_not_torn_by_concurrent_apply() {
        let r = Arc::new(StatsReconciler::new());
        let authoritative = StatsAggregate::new(1000, 500, 250, 750, 500);

        let writer = {
            let r = Arc::clone(&r);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    r.apply(&NotificationEvent::Create(note("c")));
                }
            })
        };
        for _ in 0..100 {
            r.resync(authoritative);
            // Each create adds one to total, unread and pending together, so
            // a consistent snapshot keeps these differences intact.
            let s = r.snapshot();
            assert_eq!(s.total - authoritative.total, s.unread - authoritative.unread);
            assert_eq!(s.total - authoritative.total, s.pending - authoritative.pending);
        }
        writer.join().unwrap();
    }
}
