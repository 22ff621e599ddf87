//! Oboe-based playback backend for Android
//!
//! Streams are opened exclusive and low-latency with 16-bit output, the fast
//! path on AAudio devices. Oboe's default stream values are seeded with the
//! negotiated parameters before the first stream opens so OpenSL ES
//! fallbacks pick the same geometry.
//!
//! When a stream is disconnected (headphones plugged in, a Bluetooth route
//! change) Oboe closes it and reports the error after close. The callback
//! flags the engine and the backend reopens it with the same parameters the
//! next time the engine is used, resuming the bound source and cursor.

use std::path::Path;

use log::{debug, info, warn};
use oboe::{
    AudioOutputCallback, AudioOutputStreamSafe, AudioStream, AudioStreamAsync, AudioStreamBuilder,
    AudioStreamSafe, DataCallbackResult, DefaultStreamValues, Error as OboeError, Mono, Output,
    PerformanceMode, SharingMode, Stereo,
};

use super::{check_channel_count, EngineTable, PlaybackBackend, StreamHealth};
use crate::audio::{PlaybackSession, Renderer};
use crate::config::EngineConfig;
use crate::error::{log_playback_error, PlaybackError};
use crate::stream::{EngineHandle, PlaybackRegion, StreamParameters};

fn report_closed_stream(health: &StreamHealth, error: OboeError) {
    warn!("[OboeBackend] Output stream closed: {:?}", error);
    health.mark_disconnected();
}

/// Mono output callback
pub struct MonoCallback {
    renderer: Renderer,
    health: StreamHealth,
}

impl AudioOutputCallback for MonoCallback {
    type FrameType = (i16, Mono);

    fn on_audio_ready(
        &mut self,
        stream: &mut dyn AudioOutputStreamSafe,
        frames: &mut [i16],
    ) -> DataCallbackResult {
        self.renderer
            .record_latency(stream.calculate_latency_millis().ok());
        self.renderer.render(frames, |sample| sample);
        DataCallbackResult::Continue
    }

    fn on_error_after_close(
        &mut self,
        _audio_stream: &mut dyn AudioOutputStreamSafe,
        error: OboeError,
    ) {
        report_closed_stream(&self.health, error);
    }
}

/// Stereo output callback; Oboe hands out one tuple per frame
pub struct StereoCallback {
    renderer: Renderer,
    health: StreamHealth,
}

impl AudioOutputCallback for StereoCallback {
    type FrameType = (i16, Stereo);

    fn on_audio_ready(
        &mut self,
        stream: &mut dyn AudioOutputStreamSafe,
        frames: &mut [(i16, i16)],
    ) -> DataCallbackResult {
        self.renderer
            .record_latency(stream.calculate_latency_millis().ok());
        let frame_count = frames.len();
        self.renderer.render_with(frame_count, |index, sample| {
            let Some(frame) = frames.get_mut(index / 2) else {
                return;
            };
            if index % 2 == 0 {
                frame.0 = sample;
            } else {
                frame.1 = sample;
            }
        });
        DataCallbackResult::Continue
    }

    fn on_error_after_close(
        &mut self,
        _audio_stream: &mut dyn AudioOutputStreamSafe,
        error: OboeError,
    ) {
        report_closed_stream(&self.health, error);
    }
}

enum OutputStream {
    Mono(AudioStreamAsync<Output, MonoCallback>),
    Stereo(AudioStreamAsync<Output, StereoCallback>),
}

impl OutputStream {
    fn open(
        params: StreamParameters,
        renderer: Renderer,
        health: StreamHealth,
    ) -> Result<Self, PlaybackError> {
        check_channel_count(params.channel_count)?;
        let builder = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::LowLatency)
            .set_sharing_mode(SharingMode::Exclusive)
            .set_direction::<Output>()
            .set_sample_rate(params.sample_rate_hz as i32)
            .set_frames_per_callback(params.frames_per_burst as i32)
            .set_format::<i16>();

        let mut stream = if params.channel_count == 1 {
            let stream = builder
                .set_channel_count::<Mono>()
                .set_callback(MonoCallback { renderer, health })
                .open_stream()
                .map_err(|e| PlaybackError::StreamOpenFailed {
                    reason: format!("Mono output stream: {:?}", e),
                })?;
            OutputStream::Mono(stream)
        } else {
            let stream = builder
                .set_channel_count::<Stereo>()
                .set_callback(StereoCallback { renderer, health })
                .open_stream()
                .map_err(|e| PlaybackError::StreamOpenFailed {
                    reason: format!("Stereo output stream: {:?}", e),
                })?;
            OutputStream::Stereo(stream)
        };

        let started = match &mut stream {
            OutputStream::Mono(s) => s.start(),
            OutputStream::Stereo(s) => s.start(),
        };
        started.map_err(|e| PlaybackError::HardwareError {
            details: format!("Failed to start output stream: {:?}", e),
        })?;

        Ok(stream)
    }

    fn stop(&mut self) -> Result<(), PlaybackError> {
        let stopped = match self {
            OutputStream::Mono(s) => s.stop(),
            OutputStream::Stereo(s) => s.stop(),
        };
        stopped.map_err(|e| PlaybackError::HardwareError {
            details: format!("Failed to stop output stream: {:?}", e),
        })
    }
}

struct OboeEngine {
    session: PlaybackSession,
    health: StreamHealth,
    /// `None` after a failed reopen; queries keep answering from the session
    stream: Option<OutputStream>,
}

// SAFETY: the Oboe stream handle is only started, stopped and closed under
// the controller's mutex; the data callback runs on Oboe's own thread and
// owns nothing but the `Renderer`.
#[allow(unsafe_code)]
unsafe impl Send for OboeEngine {}

impl OboeEngine {
    fn open(params: StreamParameters, config: &EngineConfig) -> Result<Self, PlaybackError> {
        let (session, renderer) = PlaybackSession::new(params, config);
        let health = StreamHealth::new();
        let stream = OutputStream::open(params, renderer, health.clone())?;
        info!("[OboeBackend] Output stream opened: {}", params);
        Ok(Self {
            session,
            health,
            stream: Some(stream),
        })
    }

    fn close(&mut self) -> Result<(), PlaybackError> {
        match self.stream.take() {
            // Closed when dropped after stopping
            Some(mut stream) => stream.stop(),
            None => Ok(()),
        }
    }
}

/// Android playback backend
pub struct OboeBackend {
    config: EngineConfig,
    engines: EngineTable<OboeEngine>,
}

impl OboeBackend {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            engines: EngineTable::new(),
        }
    }

    fn session(&self, handle: &EngineHandle) -> Result<&PlaybackSession, PlaybackError> {
        self.engines.get(handle).map(|engine| &engine.session)
    }

    fn session_mut(&mut self, handle: &EngineHandle) -> Result<&mut PlaybackSession, PlaybackError> {
        self.engines.get_mut(handle).map(|engine| &mut engine.session)
    }

    /// Stop the stream, then open a new one with updated parameters and
    /// carry the bound source and cursor over.
    fn reopen(
        &mut self,
        handle: &EngineHandle,
        update: impl FnOnce(&mut StreamParameters),
    ) -> Result<(), PlaybackError> {
        let engine = self.engines.get_mut(handle)?;
        let mut params = engine.session.params();
        update(&mut params);
        if params == engine.session.params() && engine.stream.is_some() {
            return Ok(());
        }
        check_channel_count(params.channel_count)?;

        let resume = engine.session.resume_point();
        // Exclusive streams must be released before the next one opens
        engine.close()?;
        let mut fresh = OboeEngine::open(params, &self.config)?;
        if let Some(point) = resume {
            fresh.session.resume(&point)?;
        }
        *engine = fresh;
        debug!("[OboeBackend] {} reopened with {}", handle, params);
        Ok(())
    }
}

impl PlaybackBackend for OboeBackend {
    fn create_engine(&mut self, params: StreamParameters) -> Option<EngineHandle> {
        DefaultStreamValues::set_sample_rate(params.sample_rate_hz as i32);
        DefaultStreamValues::set_channel_count(params.channel_count as i32);
        DefaultStreamValues::set_frames_per_burst(params.frames_per_burst as i32);

        match OboeEngine::open(params, &self.config) {
            Ok(engine) => self.engines.insert(engine),
            Err(err) => {
                log_playback_error(&err, "oboe_create_engine");
                None
            }
        }
    }

    fn delete_engine(&mut self, handle: &EngineHandle) {
        let result = self
            .engines
            .remove(handle)
            .and_then(|mut engine| engine.close());
        if let Err(err) = result {
            log_playback_error(&err, "oboe_delete_engine");
        }
    }

    fn set_sample_rate(&mut self, handle: &EngineHandle, sample_rate_hz: u32) {
        if let Err(err) = self.reopen(handle, |params| params.sample_rate_hz = sample_rate_hz) {
            log_playback_error(&err, "oboe_set_sample_rate");
        }
    }

    fn set_channel_count(&mut self, handle: &EngineHandle, channel_count: u16) {
        if let Err(err) = self.reopen(handle, |params| params.channel_count = channel_count) {
            log_playback_error(&err, "oboe_set_channel_count");
        }
    }

    fn prepare(&mut self, handle: &EngineHandle, source: &Path) {
        let result = self
            .session_mut(handle)
            .and_then(|session| session.prepare(source));
        if let Err(err) = result {
            log_playback_error(&err, "oboe_prepare");
        }
    }

    fn play(&mut self, handle: &EngineHandle, region: PlaybackRegion) {
        let result = self
            .session_mut(handle)
            .and_then(|session| session.play(region));
        if let Err(err) = result {
            log_playback_error(&err, "oboe_play");
        }
    }

    fn set_playback_shift(&mut self, handle: &EngineHandle, shift_millis: i64) {
        let result = self
            .session_mut(handle)
            .and_then(|session| session.set_playback_shift(shift_millis));
        if let Err(err) = result {
            log_playback_error(&err, "oboe_set_playback_shift");
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
        let Ok(engine) = self.engines.get_mut(handle) else {
            return;
        };
        if !engine.health.take_disconnected() {
            return;
        }
        // Oboe already closed the stream; drop it without stopping
        engine.stream = None;
        info!("[OboeBackend] {} disconnected, reopening", handle);
        if let Err(err) = self.reopen(handle, |_| {}) {
            log_playback_error(&err, "oboe_recover_stream");
        }
    }
}
