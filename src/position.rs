//! Interpolated playback position between sparse sync points.
//!
//! The clock keeps only the last authoritative `(position, instant,
//! playing)` triple. Every transport sync event, seek and pause/resume
//! transition re-anchors that triple; polls interpolate from it as a pure
//! function of the query instant. Elapsed time is never accumulated
//! across polls, so interpolation error cannot compound.

use std::time::Instant;

#[derive(Clone, Copy, Debug)]
pub struct PositionClock {
    position_ms: u32,
    synced_at: Instant,
    playing: bool,
}

impl Default for PositionClock {
    fn default() -> Self {
        Self {
            position_ms: 0,
            synced_at: Instant::now(),
            playing: false,
        }
    }
}

impl PositionClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-anchors the sync point at an authoritative position.
    pub fn sync(&mut self, position_ms: u32, playing: bool) {
        self.position_ms = position_ms;
        self.synced_at = Instant::now();
        self.playing = playing;
    }

    /// Freezes or unfreezes the clock at the currently interpolated
    /// position. Used on pause/resume so that no drift accrues while
    /// paused.
    pub fn set_playing(&mut self, playing: bool) {
        let now = Instant::now();
        self.position_ms = self.position_at(now, None);
        self.synced_at = now;
        self.playing = playing;
    }

    /// Resets to the stopped state.
    pub fn reset(&mut self) {
        self.sync(0, false);
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Position at `now`, clamped to `[0, duration_ms]` when the current
    /// item's duration is known.
    #[must_use]
    pub fn position_at(&self, now: Instant, duration_ms: Option<u32>) -> u32 {
        let mut position = self.position_ms;
        if self.playing {
            let elapsed = now
                .saturating_duration_since(self.synced_at)
                .as_millis()
                .min(u128::from(u32::MAX)) as u32;
            position = position.saturating_add(elapsed);
        }
        duration_ms.map_or(position, |duration| position.min(duration))
    }

    /// Position right now; see [`position_at`](Self::position_at).
    #[must_use]
    pub fn position_ms(&self, duration_ms: Option<u32>) -> u32 {
        self.position_at(Instant::now(), duration_ms)
    }
}
