use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use orders::{ChangeKind, ChangeRecord, FeedSnapshot, ShopId};
use serde_json::json;

use crate::collaborators::{
    CacheInvalidator, CacheKey, Collaborators, CuePlayer, Navigator, NotificationSink,
    NotifyError, SoundPreference,
};
use crate::notification::{Notification, Route};
use crate::notifier::{NotifierOptions, OrderNotifier};

#[derive(Default)]
pub struct RecordingCache {
    keys: Mutex<Vec<CacheKey>>,
}

impl RecordingCache {
    pub fn keys(&self) -> Vec<CacheKey> {
        self.keys.lock().unwrap().clone()
    }
}

impl CacheInvalidator for RecordingCache {
    fn invalidate(&self, key: &CacheKey) {
        self.keys.lock().unwrap().push(key.clone());
    }
}

#[derive(Default)]
pub struct RecordingSink {
    shown: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().unwrap().clone()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl NotificationSink for RecordingSink {
    fn show(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::SinkUnavailable("toaster gone".into()));
        }
        self.shown.lock().unwrap().push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingCue {
    plays: AtomicUsize,
    failing: AtomicBool,
}

impl CountingCue {
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl CuePlayer for CountingCue {
    fn play(&self) -> Result<(), NotifyError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::CueUnsupported);
        }
        Ok(())
    }
}

pub struct FixedSound(AtomicBool);

impl FixedSound {
    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

impl SoundPreference for FixedSound {
    fn sound_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

pub struct Harness {
    pub cache: Arc<RecordingCache>,
    pub sink: Arc<RecordingSink>,
    pub cue: Arc<CountingCue>,
    pub sound: Arc<FixedSound>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            cache: Arc::default(),
            sink: Arc::default(),
            cue: Arc::default(),
            sound: Arc::new(FixedSound(AtomicBool::new(true))),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(self.cache.clone(), self.sink.clone(), self.sound.clone())
            .with_cue(self.cue.clone())
    }

    pub fn notifier(&self, shop: &str) -> OrderNotifier {
        self.notifier_with(shop, NotifierOptions::default())
    }

    pub fn notifier_with(&self, shop: &str, options: NotifierOptions) -> OrderNotifier {
        OrderNotifier::new(shop_id(shop), self.collaborators(), options)
    }
}

pub fn shop_id(id: &str) -> ShopId {
    ShopId::new(id).expect("shop id")
}

pub fn snapshot(shop: &str, changes: Vec<ChangeRecord>) -> FeedSnapshot {
    FeedSnapshot {
        shop_id: shop_id(shop),
        changes,
    }
}

pub fn added(id: &str, amount: u64) -> ChangeRecord {
    ChangeRecord::new(ChangeKind::Added, id, json!({ "totalAmount": amount }))
}

pub fn added_with_status(id: &str, amount: u64, status: &str) -> ChangeRecord {
    ChangeRecord::new(
        ChangeKind::Added,
        id,
        json!({ "totalAmount": amount, "status": status }),
    )
}

pub fn modified(id: &str, status: &str) -> ChangeRecord {
    ChangeRecord::new(ChangeKind::Modified, id, json!({ "status": status }))
}

pub fn removed(id: &str) -> ChangeRecord {
    ChangeRecord::new(ChangeKind::Removed, id, serde_json::Value::Null)
}
