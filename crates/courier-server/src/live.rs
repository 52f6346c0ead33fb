//! Client-side live statistics.
//!
//! [`LiveStats`] keeps a [`StatsReconciler`] and a [`NotificationFeed`] in
//! step with the push topic. Both are seeded from the store when started
//! and replaced with a fresh store snapshot after every transport
//! reconnect, since events published while disconnected are never
//! redelivered. Between resyncs, events are folded in as they arrive.

use std::sync::Arc;

use courier_connectors::push::{EventHandler, PushBridge, PushTransport, SubscriptionHandle};
use courier_connectors::store::StatsSource;
use courier_connectors::{ConnectorError, HealthStatus};
use courier_core::{
    Notification, NotificationEvent, NotificationFeed, ReconcilerMetrics, StatsAggregate,
    StatsReconciler,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Live counters and feed for one client.
pub struct LiveStats {
    reconciler: StatsReconciler,
    feed: Mutex<NotificationFeed>,
    source: Option<Arc<dyn StatsSource>>,
    recipient_id: Option<String>,
    feed_capacity: usize,
}

impl LiveStats {
    /// Creates empty live stats.
    ///
    /// With a `source`, counters and feed are seeded and resynced from it.
    /// With a `recipient_id`, events for other recipients are ignored.
    #[must_use]
    pub fn new(
        source: Option<Arc<dyn StatsSource>>,
        recipient_id: Option<String>,
        feed_capacity: usize,
    ) -> Self {
        Self {
            reconciler: StatsReconciler::new(),
            feed: Mutex::new(NotificationFeed::new(feed_capacity)),
            source,
            recipient_id,
            feed_capacity,
        }
    }

    /// Returns the current counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsAggregate {
        self.reconciler.snapshot()
    }

    /// Returns the reconciler counters.
    #[must_use]
    pub fn reconciler_metrics(&self) -> ReconcilerMetrics {
        self.reconciler.metrics()
    }

    /// Returns the feed, newest first.
    #[must_use]
    pub fn feed(&self) -> Vec<Notification> {
        self.feed.lock().iter().cloned().collect()
    }

    /// Replaces counters and feed with the store's current state.
    ///
    /// Does nothing without a source.
    ///
    /// # Errors
    ///
    /// Returns the store error; counters and feed are left untouched.
    pub async fn resync(&self) -> Result<(), ConnectorError> {
        let Some(source) = self.source.as_ref() else {
            debug!("no stats source configured, skipping resync");
            return Ok(());
        };
        let recipient = self.recipient_id.as_deref();
        let limit = u32::try_from(self.feed_capacity).unwrap_or(u32::MAX);

        let stats = source.fetch_stats(recipient).await?;
        let recent = source.fetch_recent(recipient, limit).await?;

        // The feed lock orders this against `apply`, so counters and feed
        // are replaced together.
        let mut feed = self.feed.lock();
        self.reconciler.resync(stats);
        feed.reset(recent);
        drop(feed);
        info!(
            total = stats.total,
            unread = stats.unread,
            "live stats resynced from store"
        );
        Ok(())
    }

    /// Folds one event into the counters and the feed.
    ///
    /// Returns `false` if the event is for another recipient.
    pub fn apply(&self, event: &NotificationEvent) -> bool {
        if let Some(ref recipient) = self.recipient_id {
            if event.notification().recipient_id != *recipient {
                return false;
            }
        }
        let mut feed = self.feed.lock();
        self.reconciler.apply(event);
        feed.apply(event);
        true
    }

    /// Seeds from the store and subscribes to `topic`.
    ///
    /// A failed seed is logged and the stats start from zero; the next
    /// reconnect retries.
    pub async fn start<T: PushTransport>(
        self: Arc<Self>,
        bridge: &PushBridge,
        transport: T,
        topic: impl Into<String>,
    ) -> LiveStatsHandle {
        if let Err(e) = self.resync().await {
            warn!(error = %e, "initial live stats seed failed");
        }

        let (resync_tx, mut resync_rx) = mpsc::unbounded_channel::<()>();
        let live = Arc::clone(&self);
        let resync_task = tokio::spawn(async move {
            while resync_rx.recv().await.is_some() {
                // Collapse a burst of reconnects into one fetch.
                while resync_rx.try_recv().is_ok() {}
                if let Err(e) = live.resync().await {
                    warn!(error = %e, "live stats resync failed");
                }
            }
        });

        let (closed_tx, closed) = watch::channel(false);
        let handler = LiveHandler {
            live: Arc::clone(&self),
            resync: resync_tx,
            closed: closed_tx,
        };
        let subscription = bridge.subscribe(transport, topic, handler);

        LiveStatsHandle {
            live: self,
            subscription,
            resync_task,
            closed,
        }
    }
}

impl std::fmt::Debug for LiveStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStats")
            .field("stats", &self.snapshot())
            .field("recipient_id", &self.recipient_id)
            .finish_non_exhaustive()
    }
}

struct LiveHandler {
    live: Arc<LiveStats>,
    resync: mpsc::UnboundedSender<()>,
    closed: watch::Sender<bool>,
}

impl EventHandler for LiveHandler {
    fn on_event(&self, event: NotificationEvent) {
        self.live.apply(&event);
    }

    fn on_reconnect(&self) {
        let _ = self.resync.send(());
    }

    fn on_complete(&self) {
        self.closed.send_replace(true);
    }
}

/// A running [`LiveStats`] subscription.
#[derive(Debug)]
pub struct LiveStatsHandle {
    live: Arc<LiveStats>,
    subscription: SubscriptionHandle,
    resync_task: JoinHandle<()>,
    closed: watch::Receiver<bool>,
}

impl LiveStatsHandle {
    /// Returns the live stats.
    #[must_use]
    pub fn stats(&self) -> &Arc<LiveStats> {
        &self.live
    }

    /// Returns the push subscription health.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        self.subscription.health()
    }

    /// Returns `true` once the push subscription has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.closed.borrow() || self.subscription.is_finished()
    }

    /// Waits until the push subscription ends on its own, for example
    /// when the transport gives up reconnecting.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        // A dropped sender means the subscription task is gone as well.
        let _ = closed.wait_for(|done| *done).await;
    }

    /// Unsubscribes and waits for the resync task to finish.
    pub async fn stop(self) {
        self.subscription.unsubscribe().await;
        if let Err(e) = self.resync_task.await {
            warn!(error = %e, "live stats resync task failed");
        }
    }
}
