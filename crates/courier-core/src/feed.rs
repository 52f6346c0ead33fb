//! Client-visible notification list.
//!
//! [`NotificationFeed`] mirrors the notifications a user sees, newest
//! first, and is kept current by the same events that drive the stats.
//! Unlike the counters the feed is keyed by notification id, so a
//! duplicated `create` replaces the existing entry instead of adding a
//! second row.

use std::collections::VecDeque;

use crate::event::NotificationEvent;
use crate::model::Notification;

/// Default number of entries a feed keeps.
pub const DEFAULT_FEED_CAPACITY: usize = 200;

/// Bounded, newest-first list of notifications.
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    items: VecDeque<Notification>,
    capacity: usize,
}

impl NotificationFeed {
    /// Creates an empty feed holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(DEFAULT_FEED_CAPACITY)),
            capacity,
        }
    }

    /// Replaces the whole feed, e.g. with a freshly fetched page.
    ///
    /// `items` is expected newest first; entries beyond capacity are dropped.
    pub fn reset(&mut self, items: impl IntoIterator<Item = Notification>) {
        self.items = items.into_iter().take(self.capacity).collect();
    }

    /// Applies an event. Returns `true` if the feed changed.
    pub fn apply(&mut self, event: &NotificationEvent) -> bool {
        match event {
            NotificationEvent::Create(n) => {
                self.remove(&n.id);
                self.items.push_front(n.clone());
                self.items.truncate(self.capacity);
                true
            }
            NotificationEvent::MarkRead(n) | NotificationEvent::MarkSent(n) => {
                match self.items.iter_mut().find(|item| item.id == n.id) {
                    Some(item) => {
                        *item = n.clone();
                        true
                    }
                    None => false,
                }
            }
            NotificationEvent::Delete { notification, .. } => self.remove(&notification.id),
        }
    }

    /// Returns the entry with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    /// Iterates entries newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the feed has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of unread entries currently in the feed.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}
