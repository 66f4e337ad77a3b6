//! Daemon-side implementations of the notifier's collaborators.

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use metrics::MetricsHandle;
use notifier::{
    CacheInvalidator, CacheKey, CuePlayer, Notification, NotificationSink, NotifyError,
    SilentCue, SnapshotOutcome, WatchObserver,
};
use orders::{FeedError, ShopId};
use storage::Store;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The daemon has no query cache of its own; invalidations are counted and
/// logged for whoever fronts the order list.
pub struct InvalidationCounter {
    metrics: MetricsHandle,
}

impl InvalidationCounter {
    pub fn new(metrics: MetricsHandle) -> Self {
        Self { metrics }
    }
}

impl CacheInvalidator for InvalidationCounter {
    fn invalidate(&self, key: &CacheKey) {
        debug!(key = %key, "order cache invalidated");
        self.metrics.record_invalidation();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub style: &'static str,
    pub title: String,
    pub body: String,
}

/// Logs every notification and hands it to the journal writer task.
pub struct JournalSink {
    metrics: MetricsHandle,
    tx: mpsc::UnboundedSender<JournalEntry>,
}

impl JournalSink {
    pub fn new(metrics: MetricsHandle) -> (Self, mpsc::UnboundedReceiver<JournalEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { metrics, tx }, rx)
    }
}

impl NotificationSink for JournalSink {
    fn show(&self, notification: Notification) -> Result<(), NotifyError> {
        let style = notification.style.as_str();
        info!(
            style,
            title = %notification.title,
            body = %notification.body,
            action = ?notification.action.as_ref().map(|a| a.route.path()),
            "notification"
        );
        self.metrics.record_notification(style);
        self.tx
            .send(JournalEntry {
                style,
                title: notification.title,
                body: notification.body,
            })
            .map_err(|_| NotifyError::SinkUnavailable("journal writer stopped".into()))
    }
}

pub async fn run_journal_writer(
    store: Store,
    run_id: String,
    mut rx: mpsc::UnboundedReceiver<JournalEntry>,
) {
    while let Some(entry) = rx.recv().await {
        if let Err(err) = store
            .log_notification(&run_id, entry.style, &entry.title, &entry.body)
            .await
        {
            warn!(error = ?err, "failed to journal notification");
        }
    }
}

/// Rings the terminal bell on stderr.
pub struct TerminalBell;

impl TerminalBell {
    /// The bell when stderr is a terminal, otherwise silence.
    pub fn detect() -> Arc<dyn CuePlayer> {
        if std::io::stderr().is_terminal() {
            Arc::new(TerminalBell)
        } else {
            info!("stderr is not a terminal, audible cue disabled");
            Arc::new(SilentCue)
        }
    }
}

impl CuePlayer for TerminalBell {
    fn play(&self) -> Result<(), NotifyError> {
        let mut err = std::io::stderr();
        err.write_all(b"\x07")?;
        err.flush()?;
        Ok(())
    }
}

pub struct MetricsObserver {
    metrics: MetricsHandle,
}

impl MetricsObserver {
    pub fn new(metrics: MetricsHandle) -> Self {
        Self { metrics }
    }
}

impl WatchObserver for MetricsObserver {
    fn snapshot_processed(&self, _shop_id: &ShopId, outcome: &SnapshotOutcome) {
        self.metrics.record_snapshot(outcome.records);
    }

    fn feed_error(&self, _shop_id: &ShopId, error: &FeedError) {
        self.metrics.record_feed_error(error.code.as_str());
    }
}
