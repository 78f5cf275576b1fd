//! Persisted playback preferences.
//!
//! Settings are the only state shared across session lifetimes. They are
//! read by the session manager once at `init`; mutating them while a
//! session is live never affects that session (deferred-apply contract).

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Streaming bitrate preference.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bitrate {
    /// 96 kbps
    Low,
    /// 160 kbps
    #[default]
    Normal,
    /// 320 kbps
    High,
}

impl Bitrate {
    #[must_use]
    pub fn kbps(self) -> u32 {
        match self {
            Self::Low => 96,
            Self::Normal => 160,
            Self::High => 320,
        }
    }
}

/// Saturating mapping from the boundary's integer levels; anything above
/// the highest level is treated as the highest. The setter contract is
/// "cannot fail".
impl From<u8> for Bitrate {
    fn from(level: u8) -> Self {
        match level {
            0 => Self::Low,
            1 => Self::Normal,
            _ => Self::High,
        }
    }
}

impl From<Bitrate> for u8 {
    fn from(bitrate: Bitrate) -> Self {
        match bitrate {
            Bitrate::Low => 0,
            Bitrate::Normal => 1,
            Bitrate::High => 2,
        }
    }
}

/// Snapshot of the playback preferences, taken at session init.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Settings {
    pub bitrate: Bitrate,
    pub gapless: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bitrate: Bitrate::default(),
            gapless: true,
        }
    }
}

/// Process-lifetime store behind the fire-and-forget boundary setters.
#[derive(Debug)]
pub struct SettingsStore {
    bitrate: AtomicU8,
    gapless: AtomicBool,
}

impl Default for SettingsStore {
    fn default() -> Self {
        let defaults = Settings::default();
        Self {
            bitrate: AtomicU8::new(defaults.bitrate.into()),
            gapless: AtomicBool::new(defaults.gapless),
        }
    }
}

impl SettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bitrate(&self, bitrate: Bitrate) {
        let old = self.bitrate.swap(bitrate.into(), Ordering::SeqCst);
        if old != u8::from(bitrate) {
            debug!(
                "bitrate set to {} kbps; takes effect at next session init",
                bitrate.kbps()
            );
        }
    }

    #[must_use]
    pub fn bitrate(&self) -> Bitrate {
        self.bitrate.load(Ordering::SeqCst).into()
    }

    pub fn set_gapless(&self, enabled: bool) {
        let old = self.gapless.swap(enabled, Ordering::SeqCst);
        if old != enabled {
            debug!("gapless set to {enabled}; takes effect at next session init");
        }
    }

    #[must_use]
    pub fn gapless(&self) -> bool {
        self.gapless.load(Ordering::SeqCst)
    }

    /// Consistent copy of both preferences.
    #[must_use]
    pub fn snapshot(&self) -> Settings {
        Settings {
            bitrate: self.bitrate(),
            gapless: self.gapless(),
        }
    }
}
