//! Backend running the real session/renderer pair without an output device.
//!
//! Nothing pulls audio on its own: tests call [`HeadlessOutput::render`] to
//! play a number of frames, which is what an output callback would do, and
//! [`HeadlessOutput::disconnect`] to drop every stream the way a route change
//! does.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::audio::{PlaybackSession, Renderer};
use crate::config::EngineConfig;
use crate::engine::{check_channel_count, EngineTable, PlaybackBackend, StreamHealth};
use crate::error::{log_playback_error, PlaybackError};
use crate::stream::{EngineHandle, PlaybackRegion, StreamParameters};

struct HeadlessStream {
    renderer: Renderer,
    channel_count: usize,
    health: StreamHealth,
}

/// Stand-in for the device side: holds the renderers of live engines.
///
/// Shared with the backend, so tests keep pulling frames while the
/// controller owns the backend.
#[derive(Clone, Default)]
pub struct HeadlessOutput {
    streams: Arc<Mutex<BTreeMap<u64, HeadlessStream>>>,
}

impl HeadlessOutput {
    /// Pull `frames` frames through every live engine and return the
    /// interleaved output of the newest one (empty when none is live).
    pub fn render(&self, frames: usize) -> Vec<i16> {
        let Ok(mut streams) = self.streams.lock() else {
            return Vec::new();
        };
        let mut newest = Vec::new();
        for stream in streams.values_mut() {
            let mut out = vec![0i16; frames * stream.channel_count];
            stream.renderer.render(&mut out, |sample| sample);
            newest = out;
        }
        newest
    }

    pub fn live_streams(&self) -> usize {
        self.streams.lock().map(|streams| streams.len()).unwrap_or(0)
    }

    /// Drop every stream and flag its engine as disconnected.
    pub fn disconnect(&self) {
        if let Ok(mut streams) = self.streams.lock() {
            for (_, stream) in std::mem::take(&mut *streams) {
                stream.health.mark_disconnected();
            }
        }
    }

    fn attach(&self, raw: u64, renderer: Renderer, params: StreamParameters, health: StreamHealth) {
        if let Ok(mut streams) = self.streams.lock() {
            streams.insert(
                raw,
                HeadlessStream {
                    renderer,
                    channel_count: params.channel_count.max(1) as usize,
                    health,
                },
            );
        }
    }

    fn detach(&self, raw: u64) {
        if let Ok(mut streams) = self.streams.lock() {
            streams.remove(&raw);
        }
    }
}

struct HeadlessEngine {
    session: PlaybackSession,
    health: StreamHealth,
}

pub struct HeadlessBackend {
    config: EngineConfig,
    engines: EngineTable<HeadlessEngine>,
    output: HeadlessOutput,
}

impl HeadlessBackend {
    pub fn new(config: EngineConfig) -> (Self, HeadlessOutput) {
        let output = HeadlessOutput::default();
        let backend = Self {
            config,
            engines: EngineTable::new(),
            output: output.clone(),
        };
        (backend, output)
    }

    fn session(&self, handle: &EngineHandle) -> Result<&PlaybackSession, PlaybackError> {
        self.engines.get(handle).map(|engine| &engine.session)
    }

    fn session_mut(&mut self, handle: &EngineHandle) -> Result<&mut PlaybackSession, PlaybackError> {
        self.engines.get_mut(handle).map(|engine| &mut engine.session)
    }

    /// Replace the engine's stream with one opened for `update`d parameters,
    /// resuming the bound source and cursor.
    fn reopen(
        &mut self,
        handle: &EngineHandle,
        update: impl FnOnce(&mut StreamParameters),
    ) -> Result<(), PlaybackError> {
        let engine = self.engines.get_mut(handle)?;
        let mut params = engine.session.params();
        update(&mut params);
        check_channel_count(params.channel_count)?;
        let resume = engine.session.resume_point();

        let (mut fresh, renderer) = PlaybackSession::new(params, &self.config);
        if let Some(point) = resume {
            if let Err(err) = fresh.resume(&point) {
                log_playback_error(&err, "headless_reopen");
            }
        }
        let health = StreamHealth::new();
        *engine = HeadlessEngine {
            session: fresh,
            health: health.clone(),
        };
        self.output.attach(handle.as_raw(), renderer, params, health);
        Ok(())
    }
}

impl PlaybackBackend for HeadlessBackend {
    fn create_engine(&mut self, params: StreamParameters) -> Option<EngineHandle> {
        let (session, renderer) = PlaybackSession::new(params, &self.config);
        let health = StreamHealth::new();
        let handle = self.engines.insert(HeadlessEngine {
            session,
            health: health.clone(),
        })?;
        self.output.attach(handle.as_raw(), renderer, params, health);
        Some(handle)
    }

    fn delete_engine(&mut self, handle: &EngineHandle) {
        match self.engines.remove(handle) {
            Ok(_) => self.output.detach(handle.as_raw()),
            Err(err) => log_playback_error(&err, "headless_delete_engine"),
        }
    }

    fn set_sample_rate(&mut self, handle: &EngineHandle, sample_rate_hz: u32) {
        if let Err(err) = self.reopen(handle, |params| params.sample_rate_hz = sample_rate_hz) {
            log_playback_error(&err, "headless_set_sample_rate");
        }
    }

    fn set_channel_count(&mut self, handle: &EngineHandle, channel_count: u16) {
        if let Err(err) = self.reopen(handle, |params| params.channel_count = channel_count) {
            log_playback_error(&err, "headless_set_channel_count");
        }
    }

    fn prepare(&mut self, handle: &EngineHandle, source: &Path) {
        let result = self
            .session_mut(handle)
            .and_then(|session| session.prepare(source));
        if let Err(err) = result {
            log_playback_error(&err, "headless_prepare");
        }
    }

    fn play(&mut self, handle: &EngineHandle, region: PlaybackRegion) {
        let result = self
            .session_mut(handle)
            .and_then(|session| session.play(region));
        if let Err(err) = result {
            log_playback_error(&err, "headless_play");
        }
    }

    fn set_playback_shift(&mut self, handle: &EngineHandle, shift_millis: i64) {
        let result = self
            .session_mut(handle)
            .and_then(|session| session.set_playback_shift(shift_millis));
        if let Err(err) = result {
            log_playback_error(&err, "headless_set_playback_shift");
        }
    }

    fn current_position_millis(&self, handle: &EngineHandle) -> i64 {
        self.session(handle)
            .map(PlaybackSession::current_position_millis)
            .unwrap_or(0)
    }

    fn total_patch_millis(&self, handle: &EngineHandle) -> i64 {
        self.session(handle)
            .map(PlaybackSession::total_patch_millis)
            .unwrap_or(0)
    }

    fn current_output_latency_millis(&self, handle: &EngineHandle) -> f64 {
        self.session(handle)
            .map(PlaybackSession::current_output_latency_millis)
            .unwrap_or(0.0)
    }

    fn recover_stream(&mut self, handle: &EngineHandle) {
        let disconnected = self
            .engines
            .get(handle)
            .map(|engine| engine.health.take_disconnected())
            .unwrap_or(false);
        if disconnected {
            debug!("[HeadlessBackend] {} disconnected, reopening", handle);
            if let Err(err) = self.reopen(handle, |_| {}) {
                log_playback_error(&err, "headless_recover_stream");
            }
        }
    }
}
