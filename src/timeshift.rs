//! Time-shift arithmetic for a looping broadcast.
//!
//! A broadcast is one source of `length_ms` that started looping at
//! `epoch_ms` on the server clock. Every listener plays the loop position the
//! server clock points at, so devices with corrected clocks play in unison.
//! When the clock correction moves while playing, the difference is handed to
//! [`PlaybackController::set_playback_shift`](crate::managers::PlaybackController::set_playback_shift).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::stream::PlaybackRegion;

/// Loop position in a broadcast at `server_now_ms`.
///
/// Returns 0 for an empty loop.
pub fn live_offset_millis(server_now_ms: i64, epoch_ms: i64, length_ms: u64) -> u64 {
    if length_ms == 0 {
        return 0;
    }
    let elapsed = server_now_ms.saturating_sub(epoch_ms);
    elapsed.rem_euclid(length_ms.min(i64::MAX as u64) as i64) as u64
}

/// Shift to apply after the server clock offset moved from `offset_at_start`
/// (captured when playback started) to `offset_now`.
pub fn shift_between(offset_at_start: i64, offset_now: i64) -> i64 {
    offset_now.saturating_sub(offset_at_start)
}

/// How far the engine's reported position trails the live position.
pub fn synchronization_offset(expected_millis: i64, actual_millis: i64) -> i64 {
    expected_millis.saturating_sub(actual_millis)
}

/// Wall clock in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A looping broadcast and the listener's current server clock correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub epoch_ms: i64,
    pub length_ms: u64,
    /// Server clock minus local clock
    pub server_offset_ms: i64,
}

impl Broadcast {
    pub fn new(epoch_ms: i64, length_ms: u64) -> Self {
        Self {
            epoch_ms,
            length_ms,
            server_offset_ms: 0,
        }
    }

    /// Region to hand to `play` when the local clock reads `local_now_ms`
    pub fn live_region(&self, local_now_ms: i64) -> PlaybackRegion {
        let server_now = local_now_ms.saturating_add(self.server_offset_ms);
        PlaybackRegion::new(
            live_offset_millis(server_now, self.epoch_ms, self.length_ms),
            self.length_ms,
        )
    }
}
