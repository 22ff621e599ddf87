//! Backend abstractions for the playback engine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::PlaybackError;
use crate::stream::{EngineHandle, PlaybackRegion, StreamParameters};

/// Handle-based interface to a native playback engine.
///
/// This is the whole downstream contract of the controller. Every method
/// except `create_engine` receives the handle returned by a previous
/// `create_engine` that has not yet been passed to `delete_engine`.
/// Implementations report their own failures (logging them); nothing here
/// returns an error to the controller.
pub trait PlaybackBackend: Send {
    /// Construct an engine with the negotiated stream parameters.
    /// `None` means construction failed.
    fn create_engine(&mut self, params: StreamParameters) -> Option<EngineHandle>;
    fn delete_engine(&mut self, handle: &EngineHandle);
    fn set_sample_rate(&mut self, handle: &EngineHandle, sample_rate_hz: u32);
    fn set_channel_count(&mut self, handle: &EngineHandle, channel_count: u16);
    fn prepare(&mut self, handle: &EngineHandle, source: &Path);
    fn play(&mut self, handle: &EngineHandle, region: PlaybackRegion);
    fn set_playback_shift(&mut self, handle: &EngineHandle, shift_millis: i64);
    fn current_position_millis(&self, handle: &EngineHandle) -> i64;
    fn total_patch_millis(&self, handle: &EngineHandle) -> i64;
    fn current_output_latency_millis(&self, handle: &EngineHandle) -> f64;

    /// Reopen the engine's stream if the device dropped it (a route change
    /// such as headphones being plugged in) since the last call. The
    /// controller runs this before every operation on a live engine.
    fn recover_stream(&mut self, _handle: &EngineHandle) {}
}

/// Output streams carry at most two interleaved channels
pub const MAX_CHANNEL_COUNT: u16 = 2;

/// Validate a channel count before a stream is (re)opened with it.
pub fn check_channel_count(channel_count: u16) -> Result<u16, PlaybackError> {
    if (1..=MAX_CHANNEL_COUNT).contains(&channel_count) {
        Ok(channel_count)
    } else {
        Err(PlaybackError::StreamOpenFailed {
            reason: format!(
                "{} channels requested, streams support 1..={}",
                channel_count, MAX_CHANNEL_COUNT
            ),
        })
    }
}

/// Disconnect flag shared between a stream's error callback and its backend.
///
/// The callback only raises the flag; the backend reopens the stream on the
/// control thread the next time the engine is used.
#[derive(Debug, Clone, Default)]
pub struct StreamHealth {
    disconnected: Arc<AtomicBool>,
}

impl StreamHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_disconnected(&self) {
        self.disconnected.store(true, Ordering::Release);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was raised.
    pub fn take_disconnected(&self) -> bool {
        self.disconnected.swap(false, Ordering::AcqRel)
    }
}

/// Live engines of a backend keyed by raw handle value.
///
/// Raw values start at 1 and are never reused, so a stale handle can never
/// alias a newer engine.
pub struct EngineTable<E> {
    engines: HashMap<u64, E>,
    next_raw: u64,
}

impl<E> EngineTable<E> {
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
            next_raw: 1,
        }
    }

    pub fn insert(&mut self, engine: E) -> Option<EngineHandle> {
        let raw = self.next_raw;
        let handle = EngineHandle::from_raw(raw)?;
        self.next_raw = raw.checked_add(1)?;
        self.engines.insert(raw, engine);
        Some(handle)
    }

    pub fn remove(&mut self, handle: &EngineHandle) -> Result<E, PlaybackError> {
        self.engines
            .remove(&handle.as_raw())
            .ok_or_else(|| unknown(handle))
    }

    pub fn get(&self, handle: &EngineHandle) -> Result<&E, PlaybackError> {
        self.engines.get(&handle.as_raw()).ok_or_else(|| unknown(handle))
    }

    pub fn get_mut(&mut self, handle: &EngineHandle) -> Result<&mut E, PlaybackError> {
        self.engines
            .get_mut(&handle.as_raw())
            .ok_or_else(|| unknown(handle))
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl<E> Default for EngineTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown(handle: &EngineHandle) -> PlaybackError {
    PlaybackError::UnknownHandle {
        handle: handle.as_raw(),
    }
}

#[cfg(target_os = "android")]
mod oboe;
#[cfg(target_os = "android")]
pub use self::oboe::OboeBackend;

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use self::cpal::CpalBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_hands_out_increasing_handles() {
        let mut table = EngineTable::new();
        let first = table.insert("a").unwrap();
        let second = table.insert("b").unwrap();
        assert_eq!(first.as_raw(), 1);
        assert_eq!(second.as_raw(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_removed_handle_is_unknown() {
        let mut table = EngineTable::new();
        let handle = table.insert(5u8).unwrap();
        assert_eq!(table.remove(&handle).unwrap(), 5);
        assert!(table.is_empty());
        assert_eq!(
            table.get(&handle).unwrap_err(),
            PlaybackError::UnknownHandle { handle: 1 }
        );
    }

    #[test]
    fn test_channel_count_bounds() {
        assert_eq!(check_channel_count(1), Ok(1));
        assert_eq!(check_channel_count(2), Ok(2));
        assert!(matches!(
            check_channel_count(0),
            Err(PlaybackError::StreamOpenFailed { .. })
        ));
        assert!(matches!(
            check_channel_count(3),
            Err(PlaybackError::StreamOpenFailed { .. })
        ));
    }

    #[test]
    fn test_health_flag_is_taken_once() {
        let health = StreamHealth::new();
        let callback_side = health.clone();
        assert!(!health.take_disconnected());

        callback_side.mark_disconnected();
        assert!(health.is_disconnected());
        assert!(health.take_disconnected());
        assert!(!health.take_disconnected());
    }

    #[test]
    fn test_raw_values_are_not_reused() {
        let mut table = EngineTable::new();
        let first = table.insert(()).unwrap();
        table.remove(&first).unwrap();
        let second = table.insert(()).unwrap();
        assert_ne!(first, second);
    }
}
