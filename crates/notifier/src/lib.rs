//! Live order notifications for a single shop.
//!
//! [`OrderNotifier`] turns feed snapshots into cache invalidations and
//! owner-facing notifications; [`OrderWatch`] owns the subscription that
//! drives it and rebuilds both whenever the watched shop changes.

mod collaborators;
mod notification;
mod notifier;
mod watch;

#[cfg(test)]
mod test_support;

pub use collaborators::{
    CacheInvalidator, CacheKey, Collaborators, CuePlayer, Navigator, NotificationSink,
    NotifyError, SilentCue, SoundPreference,
};
pub use notification::{Notification, NotificationAction, NotificationStyle, Route};
pub use notifier::{NotifierOptions, OrderNotifier, SnapshotOutcome};
pub use watch::{OrderWatch, WatchObserver, WatchStatus};
