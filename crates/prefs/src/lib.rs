use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Storage key of the audible-cue preference.
pub const SOUND_PREF_KEY: &str = "notifications_sound";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundState {
    #[default]
    On,
    Off,
}

impl From<bool> for SoundState {
    fn from(enabled: bool) -> Self {
        if enabled {
            SoundState::On
        } else {
            SoundState::Off
        }
    }
}

/// Shared audible-cue toggle. Cloning shares the flag.
#[derive(Clone, Default)]
pub struct SoundSetting {
    state: Arc<RwLock<SoundState>>,
}

impl SoundSetting {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: Arc::new(RwLock::new(enabled.into())),
        }
    }

    pub fn set(&self, enabled: bool) {
        if let Ok(mut guard) = self.state.write() {
            *guard = enabled.into();
        }
    }

    pub fn state(&self) -> SoundState {
        self.state.read().map(|g| *g).unwrap_or_default()
    }

    pub fn enabled(&self) -> bool {
        self.state() == SoundState::On
    }
}

/// Reads a persisted flag the way the dashboard stored it: anything other
/// than an explicit `"false"` leaves sound on.
pub fn parse_sound_flag(raw: Option<&str>) -> bool {
    raw.map(|v| v.trim() != "false").unwrap_or(true)
}
