use std::fmt;
use std::sync::Arc;

use orders::ShopId;
use prefs::SoundSetting;
use thiserror::Error;

use crate::notification::{Notification, Route};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification sink unavailable: {0}")]
    SinkUnavailable(String),
    #[error("audible cue unsupported on this host")]
    CueUnsupported,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Query-cache key for a shop's order list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: &'static str,
    pub shop_id: ShopId,
}

impl CacheKey {
    pub fn shop_orders(shop_id: &ShopId) -> Self {
        Self {
            scope: "shop-orders",
            shop_id: shop_id.clone(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.shop_id)
    }
}

pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, key: &CacheKey);
}

pub trait NotificationSink: Send + Sync {
    fn show(&self, notification: Notification) -> Result<(), NotifyError>;
}

pub trait SoundPreference: Send + Sync {
    fn sound_enabled(&self) -> bool;
}

impl SoundPreference for SoundSetting {
    fn sound_enabled(&self) -> bool {
        self.enabled()
    }
}

pub trait CuePlayer: Send + Sync {
    fn play(&self) -> Result<(), NotifyError>;
}

/// Fallback for hosts without any audio output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentCue;

impl CuePlayer for SilentCue {
    fn play(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Routing for a notification's action. Activation is driven by the front
/// end that renders notifications; `orderd` has no such surface and only
/// journals the action's route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

#[derive(Clone)]
pub struct Collaborators {
    pub cache: Arc<dyn CacheInvalidator>,
    pub sink: Arc<dyn NotificationSink>,
    pub sound: Arc<dyn SoundPreference>,
    pub cue: Arc<dyn CuePlayer>,
}

impl Collaborators {
    pub fn new(
        cache: Arc<dyn CacheInvalidator>,
        sink: Arc<dyn NotificationSink>,
        sound: Arc<dyn SoundPreference>,
    ) -> Self {
        Self {
            cache,
            sink,
            sound,
            cue: Arc::new(SilentCue),
        }
    }

    pub fn with_cue(mut self, cue: Arc<dyn CuePlayer>) -> Self {
        self.cue = cue;
        self
    }
}
