//! CPAL-based playback backend for desktop platforms (Linux, macOS, Windows)
//!
//! Each engine owns one output stream on the default device. The stream
//! callback owns the engine's [`Renderer`]; the backend keeps the matching
//! [`PlaybackSession`] for control and queries. A stream whose device goes
//! away is reopened on the current default device the next time the engine
//! is used.

use std::path::Path;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, SupportedBufferSize};
use log::{debug, info};

use super::{check_channel_count, EngineTable, PlaybackBackend, StreamHealth};
use crate::audio::{PlaybackSession, Renderer};
use crate::config::EngineConfig;
use crate::error::{log_playback_error, PlaybackError};
use crate::stream::{EngineHandle, PlaybackRegion, StreamParameters};

struct CpalEngine {
    session: PlaybackSession,
    health: StreamHealth,
    /// Kept alive for the engine's lifetime; dropping it closes the stream
    _stream: cpal::Stream,
}

// SAFETY: cpal marks `Stream` !Send on every platform with a PhantomData
// marker. The stream is created, held and dropped under the controller's
// mutex and never touched from the audio callback; the callback state it
// owns (`Renderer`) is Send.
#[allow(unsafe_code)]
unsafe impl Send for CpalEngine {}

impl CpalEngine {
    fn open(params: StreamParameters, config: &EngineConfig) -> Result<Self, PlaybackError> {
        check_channel_count(params.channel_count)?;
        let (session, renderer) = PlaybackSession::new(params, config);
        let health = StreamHealth::new();
        let stream = open_output_stream(params, renderer, health.clone())?;
        stream.play().map_err(|e| PlaybackError::HardwareError {
            details: format!("Failed to start output stream: {:?}", e),
        })?;
        info!("[CpalBackend] Output stream opened: {}", params);
        Ok(Self {
            session,
            health,
            _stream: stream,
        })
    }
}

/// Desktop playback backend
pub struct CpalBackend {
    config: EngineConfig,
    engines: EngineTable<CpalEngine>,
}

impl CpalBackend {
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

    /// Reopen the stream with updated parameters, carrying the bound source
    /// and cursor over to the new stream.
    fn reopen(
        &mut self,
        handle: &EngineHandle,
        update: impl FnOnce(&mut StreamParameters),
    ) -> Result<(), PlaybackError> {
        let engine = self.engines.get_mut(handle)?;
        let mut params = engine.session.params();
        update(&mut params);
        if params == engine.session.params() {
            return Ok(());
        }
        self.replace_stream(handle, params)
    }

    fn replace_stream(
        &mut self,
        handle: &EngineHandle,
        params: StreamParameters,
    ) -> Result<(), PlaybackError> {
        let engine = self.engines.get_mut(handle)?;
        let resume = engine.session.resume_point();
        let mut fresh = CpalEngine::open(params, &self.config)?;
        if let Some(point) = resume {
            fresh.session.resume(&point)?;
        }
        // Old stream is dropped (and closed) here
        *engine = fresh;
        debug!("[CpalBackend] {} reopened with {}", handle, params);
        Ok(())
    }
}

impl PlaybackBackend for CpalBackend {
    fn create_engine(&mut self, params: StreamParameters) -> Option<EngineHandle> {
        match CpalEngine::open(params, &self.config) {
            Ok(engine) => self.engines.insert(engine),
            Err(err) => {
                log_playback_error(&err, "cpal_create_engine");
                None
            }
        }
    }

    fn delete_engine(&mut self, handle: &EngineHandle) {
        if let Err(err) = self.engines.remove(handle) {
            log_playback_error(&err, "cpal_delete_engine");
        }
    }

    fn set_sample_rate(&mut self, handle: &EngineHandle, sample_rate_hz: u32) {
        if let Err(err) = self.reopen(handle, |params| params.sample_rate_hz = sample_rate_hz) {
            log_playback_error(&err, "cpal_set_sample_rate");
        }
    }

    fn set_channel_count(&mut self, handle: &EngineHandle, channel_count: u16) {
        if let Err(err) = self.reopen(handle, |params| params.channel_count = channel_count) {
            log_playback_error(&err, "cpal_set_channel_count");
        }
    }

    fn prepare(&mut self, handle: &EngineHandle, source: &Path) {
        let result = self
            .session_mut(handle)
            .and_then(|session| session.prepare(source));
        if let Err(err) = result {
            log_playback_error(&err, "cpal_prepare");
        }
    }

    fn play(&mut self, handle: &EngineHandle, region: PlaybackRegion) {
        let result = self
            .session_mut(handle)
            .and_then(|session| session.play(region));
        if let Err(err) = result {
            log_playback_error(&err, "cpal_play");
        }
    }

    fn set_playback_shift(&mut self, handle: &EngineHandle, shift_millis: i64) {
        let result = self
            .session_mut(handle)
            .and_then(|session| session.set_playback_shift(shift_millis));
        if let Err(err) = result {
            log_playback_error(&err, "cpal_set_playback_shift");
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
        let Ok(engine) = self.engines.get(handle) else {
            return;
        };
        if !engine.health.take_disconnected() {
            return;
        }
        let params = engine.session.params();
        info!("[CpalBackend] {} lost its device, reopening", handle);
        if let Err(err) = self.replace_stream(handle, params) {
            // Flag stays clear; the next device error raises it again
            log_playback_error(&err, "cpal_recover_stream");
        }
    }
}

fn open_output_stream(
    params: StreamParameters,
    renderer: Renderer,
    health: StreamHealth,
) -> Result<cpal::Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PlaybackError::StreamOpenFailed {
            reason: "No default output device found".to_string(),
        })?;

    let supported = device
        .default_output_config()
        .map_err(|e| PlaybackError::StreamOpenFailed {
            reason: format!("Failed to get default output config: {:?}", e),
        })?;

    let stream_config = cpal::StreamConfig {
        channels: params.channel_count,
        sample_rate: cpal::SampleRate(params.sample_rate_hz),
        buffer_size: burst_buffer_size(supported.buffer_size(), params.frames_per_burst),
    };

    match supported.sample_format() {
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, renderer, health),
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, renderer, health),
        other => Err(PlaybackError::StreamOpenFailed {
            reason: format!("Unsupported output sample format {:?}", other),
        }),
    }
}

/// Ask for exactly one burst per callback when the device allows it.
fn burst_buffer_size(supported: &SupportedBufferSize, frames_per_burst: u32) -> cpal::BufferSize {
    match supported {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames_per_burst) => {
            cpal::BufferSize::Fixed(frames_per_burst)
        }
        _ => cpal::BufferSize::Default,
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
    health: StreamHealth,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<i16>,
{
    let err_fn = move |err: cpal::StreamError| {
        if matches!(err, cpal::StreamError::DeviceNotAvailable) {
            health.mark_disconnected();
        }
        log_playback_error(
            &PlaybackError::HardwareError {
                details: format!("Output stream error: {}", err),
            },
            "cpal_output_stream",
        );
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                let timestamp = info.timestamp();
                let latency = timestamp
                    .playback
                    .duration_since(&timestamp.callback)
                    .map(|d| d.as_secs_f64() * 1000.0);
                renderer.record_latency(latency);
                renderer.render(data, |sample| T::from_sample(sample));
            },
            err_fn,
            None,
        )
        .map_err(|e| PlaybackError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_size_used_when_in_range() {
        let supported = SupportedBufferSize::Range { min: 64, max: 4096 };
        assert_eq!(
            burst_buffer_size(&supported, 192),
            cpal::BufferSize::Fixed(192)
        );
    }

    #[test]
    fn test_burst_size_out_of_range_uses_default() {
        let supported = SupportedBufferSize::Range { min: 256, max: 4096 };
        assert_eq!(burst_buffer_size(&supported, 192), cpal::BufferSize::Default);
        assert_eq!(
            burst_buffer_size(&SupportedBufferSize::Unknown, 192),
            cpal::BufferSize::Default
        );
    }

    #[test]
    fn test_unknown_handle_queries_are_neutral() {
        let backend = CpalBackend::new(EngineConfig::default());
        let handle = EngineHandle::from_raw(99).unwrap();
        assert_eq!(backend.current_position_millis(&handle), 0);
        assert_eq!(backend.total_patch_millis(&handle), 0);
        assert_eq!(backend.current_output_latency_millis(&handle), 0.0);
    }
}
