use std::sync::{Arc, Mutex, PoisonError};

use feed::{FeedEvent, FeedSource, FeedStream};
use orders::{FeedError, ShopId};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::Collaborators;
use crate::notifier::{NotifierOptions, OrderNotifier, SnapshotOutcome};

/// Hook for counting what the watch processes. Both methods run with the
/// subscription's state locked, so keep them cheap.
pub trait WatchObserver: Send + Sync {
    fn snapshot_processed(&self, _shop_id: &ShopId, _outcome: &SnapshotOutcome) {}
    fn feed_error(&self, _shop_id: &ShopId, _error: &FeedError) {}
}

impl WatchObserver for () {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchStatus {
    pub shop_id: ShopId,
    pub subscription_id: Uuid,
    pub seen_orders: usize,
    pub first_load: bool,
}

type SharedNotifier = Arc<Mutex<Option<OrderNotifier>>>;

struct Subscription {
    id: Uuid,
    shop_id: ShopId,
    notifier: SharedNotifier,
    task: JoinHandle<()>,
}

/// Owns the live subscription for the currently selected shop.
///
/// Switching shops, or clearing the shop, tears the old subscription down
/// before anything else happens; the next one starts from an empty
/// seen-orders set. Must be used from within a tokio runtime.
pub struct OrderWatch {
    feed: Arc<dyn FeedSource>,
    collaborators: Collaborators,
    options: NotifierOptions,
    observer: Arc<dyn WatchObserver>,
    active: Option<Subscription>,
}

impl OrderWatch {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        collaborators: Collaborators,
        options: NotifierOptions,
    ) -> Self {
        Self {
            feed,
            collaborators,
            options,
            observer: Arc::new(()),
            active: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn WatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn shop_id(&self) -> Option<&ShopId> {
        self.active.as_ref().map(|sub| &sub.shop_id)
    }

    /// Points the watch at `shop_id`. Returns false when nothing changed.
    pub fn set_shop(&mut self, shop_id: Option<ShopId>) -> bool {
        if self.shop_id() == shop_id.as_ref() {
            return false;
        }
        self.teardown();
        if let Some(shop_id) = shop_id {
            self.subscribe(shop_id);
        }
        true
    }

    fn subscribe(&mut self, shop_id: ShopId) {
        let id = Uuid::new_v4();
        let notifier = OrderNotifier::new(shop_id.clone(), self.collaborators.clone(), self.options);
        let notifier: SharedNotifier = Arc::new(Mutex::new(Some(notifier)));
        let stream = self.feed.subscribe(&shop_id);
        let task = tokio::spawn(drive(
            stream,
            Arc::clone(&notifier),
            Arc::clone(&self.observer),
        ));
        info!(shop_id = %shop_id, subscription_id = %id, "order feed subscribed");
        self.active = Some(Subscription {
            id,
            shop_id,
            notifier,
            task,
        });
    }

    /// Stops the current subscription. Once this returns no further feed
    /// event is acted on, even one that was already being delivered.
    pub fn teardown(&mut self) {
        let Some(sub) = self.active.take() else {
            return;
        };
        // Waits out a snapshot that is mid-processing.
        sub.notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        sub.task.abort();
        info!(shop_id = %sub.shop_id, subscription_id = %sub.id, "order feed unsubscribed");
    }

    pub fn status(&self) -> Option<WatchStatus> {
        let sub = self.active.as_ref()?;
        let guard = sub.notifier.lock().unwrap_or_else(PoisonError::into_inner);
        let notifier = guard.as_ref()?;
        Some(WatchStatus {
            shop_id: sub.shop_id.clone(),
            subscription_id: sub.id,
            seen_orders: notifier.seen_count(),
            first_load: notifier.is_first_load(),
        })
    }
}

impl Drop for OrderWatch {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn drive(mut stream: FeedStream, shared: SharedNotifier, observer: Arc<dyn WatchObserver>) {
    while let Some(event) = stream.recv().await {
        if !apply(&shared, event, observer.as_ref()) {
            break;
        }
    }
    debug!("order feed stream closed");
}

/// Runs one feed event through the notifier. Returns false once the
/// subscription has been torn down.
fn apply(shared: &SharedNotifier, event: FeedEvent, observer: &dyn WatchObserver) -> bool {
    let Ok(mut guard) = shared.lock() else {
        warn!("order notifier state poisoned, stopping subscription");
        return false;
    };
    let Some(notifier) = guard.as_mut() else {
        return false;
    };
    match event {
        FeedEvent::Snapshot(snapshot) => {
            let outcome = notifier.handle_snapshot(&snapshot);
            debug!(
                shop_id = %notifier.shop_id(),
                records = outcome.records,
                new_orders = outcome.new_orders,
                "snapshot processed"
            );
            observer.snapshot_processed(notifier.shop_id(), &outcome);
        }
        FeedEvent::Error(err) => {
            notifier.handle_error(&err);
            observer.feed_error(notifier.shop_id(), &err);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationStyle;
    use crate::test_support::{added, shop_id, snapshot, Harness};
    use feed::FeedHub;
    use orders::FeedError;
    use std::time::Duration;

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    fn watch(h: &Harness, hub: &FeedHub) -> OrderWatch {
        OrderWatch::new(
            Arc::new(hub.clone()),
            h.collaborators(),
            NotifierOptions::default(),
        )
    }

    #[tokio::test]
    async fn notifies_new_orders_after_initial_snapshot() {
        let h = Harness::new();
        let hub = FeedHub::new();
        let mut watch = watch(&h, &hub);
        assert!(watch.set_shop(Some(shop_id("a"))));
        assert!(!watch.set_shop(Some(shop_id("a"))));

        hub.publish_snapshot(snapshot("a", vec![added("o1", 1), added("o2", 2), added("o3", 3)]));
        wait_until(|| watch.status().is_some_and(|s| !s.first_load)).await;
        let status = watch.status().expect("status");
        assert_eq!(status.seen_orders, 3);
        assert!(h.sink.shown().is_empty());

        hub.publish_snapshot(snapshot("a", vec![added("o5", 250)]));
        wait_until(|| h.sink.shown().len() == 1).await;
        let shown = h.sink.shown();
        assert!(shown[0].title.contains("o5"));
        assert!(shown[0].body.contains("250"));

        hub.publish_snapshot(snapshot("a", vec![added("o5", 250), added("o6", 6)]));
        wait_until(|| h.sink.shown().len() == 2).await;
        assert!(h.sink.shown()[1].title.contains("o6"));
        assert_eq!(watch.status().expect("status").seen_orders, 5);
    }

    #[tokio::test]
    async fn feed_errors_are_surfaced() {
        let h = Harness::new();
        let hub = FeedHub::new();
        let mut watch = watch(&h, &hub);
        watch.set_shop(Some(shop_id("a")));

        hub.publish_error(&shop_id("a"), FeedError::new("permission-denied", "rules"));
        wait_until(|| h.sink.shown().len() == 1).await;
        let shown = h.sink.shown();
        assert_eq!(shown[0].style, NotificationStyle::Destructive);
        assert!(shown[0].body.contains("access rules"));
    }

    #[tokio::test]
    async fn switching_shops_resets_state_and_drops_old_feed() {
        let h = Harness::new();
        let hub = FeedHub::new();
        let mut watch = watch(&h, &hub);
        watch.set_shop(Some(shop_id("a")));
        hub.publish_snapshot(snapshot("a", vec![added("o1", 1)]));
        wait_until(|| watch.status().is_some_and(|s| s.seen_orders == 1)).await;
        let old_id = watch.status().expect("status").subscription_id;

        assert!(watch.set_shop(Some(shop_id("b"))));
        let status = watch.status().expect("status");
        assert_eq!(status.shop_id, shop_id("b"));
        assert_ne!(status.subscription_id, old_id);
        assert_eq!(status.seen_orders, 0);
        assert!(status.first_load);

        wait_until(|| hub.subscriber_count(&shop_id("a")) == 0).await;
        assert_eq!(hub.publish_snapshot(snapshot("a", vec![added("o2", 2)])), 0);

        hub.publish_snapshot(snapshot("b", vec![added("o1", 1)]));
        hub.publish_snapshot(snapshot("b", vec![added("b7", 70)]));
        wait_until(|| h.sink.shown().len() == 1).await;
        assert!(h.sink.shown()[0].title.contains("b7"));
        assert_eq!(watch.status().expect("status").seen_orders, 2);
    }

    #[tokio::test]
    async fn clearing_the_shop_tears_down() {
        let h = Harness::new();
        let hub = FeedHub::new();
        let mut watch = watch(&h, &hub);
        watch.set_shop(Some(shop_id("a")));
        assert!(watch.set_shop(None));
        assert!(watch.status().is_none());
        assert!(watch.shop_id().is_none());

        wait_until(|| hub.subscriber_count(&shop_id("a")) == 0).await;
        hub.publish_error(&shop_id("a"), FeedError::new("unavailable", "down"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.sink.shown().is_empty());
    }

    #[tokio::test]
    async fn event_queued_before_switch_is_not_acted_on() {
        let h = Harness::new();
        let hub = FeedHub::new();
        let mut watch = watch(&h, &hub);
        watch.set_shop(Some(shop_id("a")));
        hub.publish_snapshot(snapshot("a", vec![added("o1", 1)]));
        wait_until(|| watch.status().is_some_and(|s| !s.first_load)).await;

        // Queued for a's task, which has not run yet on this single thread.
        assert_eq!(hub.publish_snapshot(snapshot("a", vec![added("late", 9)])), 1);
        watch.set_shop(Some(shop_id("b")));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.sink.shown().is_empty());
        let status = watch.status().expect("status");
        assert_eq!(status.shop_id, shop_id("b"));
        assert_eq!(status.seen_orders, 0);
    }

    #[tokio::test]
    async fn repeated_watch_unwatch_keeps_hub_bounded() {
        let h = Harness::new();
        let hub = FeedHub::new();
        let mut watch = watch(&h, &hub);
        for _ in 0..200 {
            watch.set_shop(Some(shop_id("a")));
            watch.set_shop(None);
            tokio::task::yield_now().await;
        }
        assert!(hub.retained_senders(&shop_id("a")) <= 2);
        wait_until(|| hub.subscriber_count(&shop_id("a")) == 0).await;
        assert_eq!(hub.retained_senders(&shop_id("a")), 0);
    }

    #[tokio::test]
    async fn observer_sees_outcomes() {
        #[derive(Default)]
        struct Counting {
            snapshots: Mutex<Vec<SnapshotOutcome>>,
            errors: Mutex<usize>,
        }
        impl WatchObserver for Counting {
            fn snapshot_processed(&self, _shop_id: &ShopId, outcome: &SnapshotOutcome) {
                self.snapshots.lock().unwrap().push(*outcome);
            }
            fn feed_error(&self, _shop_id: &ShopId, _error: &FeedError) {
                *self.errors.lock().unwrap() += 1;
            }
        }

        let h = Harness::new();
        let hub = FeedHub::new();
        let observer = Arc::new(Counting::default());
        let mut watch = watch(&h, &hub).with_observer(observer.clone());
        watch.set_shop(Some(shop_id("a")));

        hub.publish_snapshot(snapshot("a", vec![added("o1", 1)]));
        hub.publish_snapshot(snapshot("a", vec![added("o2", 2)]));
        hub.publish_error(&shop_id("a"), FeedError::new("internal", "boom"));
        wait_until(|| *observer.errors.lock().unwrap() == 1).await;

        let snapshots = observer.snapshots.lock().unwrap().clone();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].new_orders, 0);
        assert_eq!(snapshots[1].new_orders, 1);
    }
}
