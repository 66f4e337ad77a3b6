use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use orders::{FeedError, FeedSnapshot, ShopId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One callback's worth of data from a live order feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FeedEvent {
    Snapshot(FeedSnapshot),
    Error(FeedError),
}

/// Receiving end of a subscription. Dropping it ends the subscription.
pub type FeedStream = mpsc::UnboundedReceiver<FeedEvent>;

/// A live per-shop order feed. Reconnects and backoff, if any, are the
/// source's business; subscribers only see snapshots and errors.
pub trait FeedSource: Send + Sync + 'static {
    fn subscribe(&self, shop_id: &ShopId) -> FeedStream;
}

/// In-process fan-out: publishers push events for a shop, every live
/// subscriber of that shop receives a copy.
#[derive(Clone, Default)]
pub struct FeedHub {
    subscribers: Arc<Mutex<HashMap<ShopId, Vec<mpsc::UnboundedSender<FeedEvent>>>>>,
}

impl FeedHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to the shop's subscribers and returns how many got
    /// it. Subscribers whose stream was dropped are pruned here.
    pub fn publish(&self, shop_id: &ShopId, event: FeedEvent) -> usize {
        let Ok(mut guard) = self.subscribers.lock() else {
            warn!(shop_id = %shop_id, "feed hub lock poisoned, dropping event");
            return 0;
        };
        let Some(senders) = guard.get_mut(shop_id) else {
            debug!(shop_id = %shop_id, "no subscribers for feed event");
            return 0;
        };
        senders.retain(|tx| tx.send(event.clone()).is_ok());
        let delivered = senders.len();
        if senders.is_empty() {
            guard.remove(shop_id);
        }
        delivered
    }

    pub fn publish_snapshot(&self, snapshot: FeedSnapshot) -> usize {
        let shop_id = snapshot.shop_id.clone();
        self.publish(&shop_id, FeedEvent::Snapshot(snapshot))
    }

    pub fn publish_error(&self, shop_id: &ShopId, error: FeedError) -> usize {
        self.publish(shop_id, FeedEvent::Error(error))
    }

    /// Live subscribers for the shop. Senders of dropped streams are
    /// pruned on the way.
    pub fn subscriber_count(&self, shop_id: &ShopId) -> usize {
        let Ok(mut guard) = self.subscribers.lock() else {
            return 0;
        };
        prune_closed(&mut guard, shop_id);
        guard.get(shop_id).map(Vec::len).unwrap_or(0)
    }

    /// Senders held for the shop, including ones whose stream was dropped
    /// and that have not been pruned yet.
    pub fn retained_senders(&self, shop_id: &ShopId) -> usize {
        self.subscribers
            .lock()
            .map(|guard| guard.get(shop_id).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

fn prune_closed(
    subscribers: &mut HashMap<ShopId, Vec<mpsc::UnboundedSender<FeedEvent>>>,
    shop_id: &ShopId,
) {
    if let Some(senders) = subscribers.get_mut(shop_id) {
        senders.retain(|tx| !tx.is_closed());
        if senders.is_empty() {
            subscribers.remove(shop_id);
        }
    }
}

impl FeedSource for FeedHub {
    fn subscribe(&self, shop_id: &ShopId) -> FeedStream {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.subscribers.lock() {
            Ok(mut guard) => {
                prune_closed(&mut guard, shop_id);
                guard.entry(shop_id.clone()).or_default().push(tx);
            }
            Err(_) => warn!(shop_id = %shop_id, "feed hub lock poisoned, subscription is inert"),
        }
        debug!(shop_id = %shop_id, "feed subscriber registered");
        rx
    }
}
