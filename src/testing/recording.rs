use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::engine::PlaybackBackend;
use crate::stream::{EngineHandle, PlaybackRegion, StreamParameters};

/// One engine call as seen by [`RecordingBackend`]. Handles are recorded by
/// raw value.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateEngine(StreamParameters),
    DeleteEngine { handle: u64 },
    SetSampleRate { handle: u64, sample_rate_hz: u32 },
    SetChannelCount { handle: u64, channel_count: u16 },
    Prepare { handle: u64, source: PathBuf },
    Play { handle: u64, region: PlaybackRegion },
    SetPlaybackShift { handle: u64, shift_millis: i64 },
    CurrentPositionMillis { handle: u64 },
    TotalPatchMillis { handle: u64 },
    CurrentOutputLatencyMillis { handle: u64 },
}

/// Shared view of the calls a [`RecordingBackend`] has received.
///
/// The log outlives the backend, so tests can keep inspecting it after the
/// controller that owned the backend is dropped.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

impl CallLog {
    fn push(&self, call: BackendCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    /// Copy of every recorded call, oldest first
    pub fn snapshot(&self) -> Vec<BackendCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<BackendCall> {
        self.calls
            .lock()
            .ok()
            .and_then(|calls| calls.last().cloned())
    }

    pub fn contains(&self, call: &BackendCall) -> bool {
        self.calls
            .lock()
            .map(|calls| calls.contains(call))
            .unwrap_or(false)
    }

    /// Number of recorded calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|call| predicate(call)).count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

/// Backend that records calls and answers queries with scripted values.
///
/// `create_engine` hands out raw handle 42 unless scripted otherwise.
/// Queries return the scripted position, total and latency for any handle.
#[derive(Debug)]
pub struct RecordingBackend {
    log: CallLog,
    handle_raw: u64,
    position_millis: i64,
    total_patch_millis: i64,
    latency_millis: f64,
    panic_on_play: bool,
}

impl RecordingBackend {
    pub fn new() -> (Self, CallLog) {
        let log = CallLog::default();
        let backend = Self {
            log: log.clone(),
            handle_raw: 42,
            position_millis: 0,
            total_patch_millis: 0,
            latency_millis: 0.0,
            panic_on_play: false,
        };
        (backend, log)
    }

    /// Raw value returned by `create_engine`; `0` makes creation fail.
    pub fn with_handle(mut self, raw: u64) -> Self {
        self.handle_raw = raw;
        self
    }

    pub fn fail_create(&mut self) {
        self.handle_raw = 0;
    }

    pub fn with_position(mut self, position_millis: i64, total_patch_millis: i64) -> Self {
        self.position_millis = position_millis;
        self.total_patch_millis = total_patch_millis;
        self
    }

    pub fn with_latency(mut self, latency_millis: f64) -> Self {
        self.latency_millis = latency_millis;
        self
    }

    /// Panic inside `play` after recording it, leaving the caller's lock
    /// poisoned.
    pub fn panic_on_play(mut self) -> Self {
        self.panic_on_play = true;
        self
    }
}

impl PlaybackBackend for RecordingBackend {
    fn create_engine(&mut self, params: StreamParameters) -> Option<EngineHandle> {
        self.log.push(BackendCall::CreateEngine(params));
        EngineHandle::from_raw(self.handle_raw)
    }

    fn delete_engine(&mut self, handle: &EngineHandle) {
        self.log.push(BackendCall::DeleteEngine {
            handle: handle.as_raw(),
        });
    }

    fn set_sample_rate(&mut self, handle: &EngineHandle, sample_rate_hz: u32) {
        self.log.push(BackendCall::SetSampleRate {
            handle: handle.as_raw(),
            sample_rate_hz,
        });
    }

    fn set_channel_count(&mut self, handle: &EngineHandle, channel_count: u16) {
        self.log.push(BackendCall::SetChannelCount {
            handle: handle.as_raw(),
            channel_count,
        });
    }

    fn prepare(&mut self, handle: &EngineHandle, source: &Path) {
        self.log.push(BackendCall::Prepare {
            handle: handle.as_raw(),
            source: source.to_path_buf(),
        });
    }

    fn play(&mut self, handle: &EngineHandle, region: PlaybackRegion) {
        self.log.push(BackendCall::Play {
            handle: handle.as_raw(),
            region,
        });
        if self.panic_on_play {
            panic!("scripted panic in play");
        }
    }

    fn set_playback_shift(&mut self, handle: &EngineHandle, shift_millis: i64) {
        self.log.push(BackendCall::SetPlaybackShift {
            handle: handle.as_raw(),
            shift_millis,
        });
    }

    fn current_position_millis(&self, handle: &EngineHandle) -> i64 {
        self.log.push(BackendCall::CurrentPositionMillis {
            handle: handle.as_raw(),
        });
        self.position_millis
    }

    fn total_patch_millis(&self, handle: &EngineHandle) -> i64 {
        self.log.push(BackendCall::TotalPatchMillis {
            handle: handle.as_raw(),
        });
        self.total_patch_millis
    }

    fn current_output_latency_millis(&self, handle: &EngineHandle) -> f64 {
        self.log.push(BackendCall::CurrentOutputLatencyMillis {
            handle: handle.as_raw(),
        });
        self.latency_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls_in_order() {
        let (mut backend, log) = RecordingBackend::new();
        let handle = backend
            .create_engine(StreamParameters::new(48000, 2, 192))
            .unwrap();
        backend.play(&handle, PlaybackRegion::new(1, 2));

        assert_eq!(
            log.snapshot(),
            vec![
                BackendCall::CreateEngine(StreamParameters::new(48000, 2, 192)),
                BackendCall::Play {
                    handle: 42,
                    region: PlaybackRegion::new(1, 2)
                },
            ]
        );
    }

    #[test]
    fn test_zero_handle_fails_create() {
        let (backend, _log) = RecordingBackend::new();
        let mut backend = backend.with_handle(0);
        assert!(backend
            .create_engine(StreamParameters::new(48000, 2, 192))
            .is_none());
    }
}
