use std::collections::{HashMap, HashSet};

use orders::{ChangeKind, ChangeRecord, FeedError, FeedSnapshot, OrderId, OrderStatus, ShopId};
use tracing::{debug, error, info, warn};

use crate::collaborators::{CacheKey, Collaborators};
use crate::notification::Notification;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierOptions {
    /// Announce status transitions carried by `modified` records. Off by
    /// default: modifications only invalidate the cache.
    pub notify_status_changes: bool,
}

/// What one snapshot did, for logging and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub records: usize,
    pub invalidations: usize,
    pub new_orders: usize,
    pub status_changes: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// Per-subscription notification state for one shop.
///
/// Every order id seen in the first snapshot is baseline and never
/// announced. After that, each id is announced at most once for the life of
/// this instance. A fresh instance is built on every re-subscription.
pub struct OrderNotifier {
    shop_id: ShopId,
    cache_key: CacheKey,
    seen: HashSet<OrderId>,
    first_load: bool,
    statuses: HashMap<OrderId, OrderStatus>,
    collaborators: Collaborators,
    options: NotifierOptions,
}

impl OrderNotifier {
    pub fn new(shop_id: ShopId, collaborators: Collaborators, options: NotifierOptions) -> Self {
        Self {
            cache_key: CacheKey::shop_orders(&shop_id),
            shop_id,
            seen: HashSet::new(),
            first_load: true,
            statuses: HashMap::new(),
            collaborators,
            options,
        }
    }

    pub fn shop_id(&self) -> &ShopId {
        &self.shop_id
    }

    pub fn is_first_load(&self) -> bool {
        self.first_load
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn has_seen(&self, id: &OrderId) -> bool {
        self.seen.contains(id)
    }

    pub fn handle_snapshot(&mut self, snapshot: &FeedSnapshot) -> SnapshotOutcome {
        let mut outcome = SnapshotOutcome::default();
        if snapshot.shop_id != self.shop_id {
            warn!(
                expected = %self.shop_id,
                got = %snapshot.shop_id,
                "ignoring snapshot for another shop"
            );
            return outcome;
        }

        for change in &snapshot.changes {
            outcome.records += 1;
            self.collaborators.cache.invalidate(&self.cache_key);
            outcome.invalidations += 1;

            if change.id.is_empty() {
                warn!(shop_id = %self.shop_id, kind = ?change.kind, "change record without order id");
                outcome.skipped += 1;
                continue;
            }

            match change.kind {
                ChangeKind::Added => self.on_added(change, &mut outcome),
                ChangeKind::Modified => self.on_modified(change, &mut outcome),
                ChangeKind::Removed => {
                    debug!(shop_id = %self.shop_id, order_id = %change.id, "order removed");
                    self.statuses.remove(&change.id);
                }
            }
        }

        if self.first_load {
            info!(
                shop_id = %self.shop_id,
                baseline = self.seen.len(),
                "initial order snapshot loaded"
            );
        }
        self.first_load = false;
        outcome
    }

    fn on_added(&mut self, change: &ChangeRecord, outcome: &mut SnapshotOutcome) {
        let summary = change.summary();
        if self.options.notify_status_changes {
            if let Some(status) = summary.status {
                self.statuses.insert(change.id.clone(), status);
            }
        }

        if self.first_load {
            self.seen.insert(change.id.clone());
            return;
        }
        if self.seen.contains(&change.id) {
            debug!(shop_id = %self.shop_id, order_id = %change.id, "duplicate add ignored");
            outcome.duplicates += 1;
            return;
        }

        info!(
            shop_id = %self.shop_id,
            order_id = %change.id,
            total_amount = ?summary.total_amount,
            "new order received"
        );
        if summary.total_amount.is_none() {
            warn!(order_id = %change.id, "new order payload has no usable totalAmount");
        }

        if self.collaborators.sound.sound_enabled() {
            if let Err(err) = self.collaborators.cue.play() {
                warn!(error = %err, "failed to play notification cue");
            }
        }
        self.show(Notification::new_order(&change.id, &summary));
        self.seen.insert(change.id.clone());
        outcome.new_orders += 1;
    }

    fn on_modified(&mut self, change: &ChangeRecord, outcome: &mut SnapshotOutcome) {
        debug!(shop_id = %self.shop_id, order_id = %change.id, "order modified");
        if !self.options.notify_status_changes {
            return;
        }
        let summary = change.summary();
        let Some(status) = summary.status else {
            return;
        };
        let previous = self.statuses.insert(change.id.clone(), status);
        if self.first_load {
            return;
        }
        if matches!(previous, Some(prev) if prev != status) {
            info!(
                shop_id = %self.shop_id,
                order_id = %change.id,
                status = %status,
                "order status changed"
            );
            self.show(Notification::status_changed(&change.id, &summary, status));
            outcome.status_changes += 1;
        }
    }

    pub fn handle_error(&mut self, err: &FeedError) {
        error!(shop_id = %self.shop_id, code = %err.code, message = %err.message, "order feed error");
        let notification = if err.is_permission_denied() {
            error!(
                shop_id = %self.shop_id,
                "permission denied: feed access rules are blocking this shop's orders"
            );
            Notification::permission_denied()
        } else {
            Notification::connection_error()
        };
        self.show(notification);
    }

    fn show(&self, notification: Notification) {
        if let Err(err) = self.collaborators.sink.show(notification) {
            warn!(shop_id = %self.shop_id, error = %err, "failed to show notification");
        }
    }
}
