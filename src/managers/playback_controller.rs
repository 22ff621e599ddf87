// PlaybackController: Owner of the single live playback engine
//
// Single Responsibility: engine lifecycle and playback-control ordering
// Every operation is fail-soft: without a live engine it is a no-op (or a
// zero query) and never reaches the backend.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use super::PlaybackStatus;
use crate::config::StreamDefaults;
use crate::engine::PlaybackBackend;
use crate::error::{log_playback_error, PlaybackError};
use crate::host::{negotiate, HostAudioProperties};
use crate::stream::{EngineHandle, PlaybackRegion, PlaybackState, StreamParameters};

/// The engine currently owned by the controller
struct LiveEngine {
    handle: EngineHandle,
    params: StreamParameters,
    phase: PlaybackState,
}

struct ControllerState<B> {
    backend: B,
    engine: Option<LiveEngine>,
}

/// Drives one playback engine through create, configure, prepare, play,
/// query and delete.
///
/// At most one engine is live at a time. The handle and the backend live
/// behind one mutex, so every method takes `&self` and concurrent callers are
/// serialized.
///
/// # Example
/// ```ignore
/// let controller = PlaybackController::new(backend, host, StreamDefaults::default());
/// if controller.create() {
///     controller.prepare("radio.pcm");
///     controller.play(PlaybackRegion::new(1000, 5000));
/// }
/// let position = controller.current_position_millis();
/// controller.delete();
/// ```
pub struct PlaybackController<B: PlaybackBackend> {
    state: Mutex<ControllerState<B>>,
    host: Arc<dyn HostAudioProperties>,
    defaults: StreamDefaults,
}

impl<B: PlaybackBackend> PlaybackController<B> {
    pub fn new(backend: B, host: Arc<dyn HostAudioProperties>, defaults: StreamDefaults) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                backend,
                engine: None,
            }),
            host,
            defaults,
        }
    }

    /// Create the engine if none is live.
    ///
    /// Stream parameters are negotiated with the host on every fresh
    /// creation. Returns `true` when an engine is live afterwards; a second
    /// call while one exists constructs nothing.
    pub fn create(&self) -> bool {
        let Some(mut guard) = self.lock_state("create") else {
            return false;
        };
        if let Some(engine) = &guard.engine {
            debug!("[PlaybackController] {} already live", engine.handle);
            return true;
        }

        let params = negotiate(self.host.as_ref(), &self.defaults);
        match guard.backend.create_engine(params) {
            Some(handle) => {
                info!("[PlaybackController] Created {} ({})", handle, params);
                guard.engine = Some(LiveEngine {
                    handle,
                    params,
                    phase: PlaybackState::Created,
                });
                true
            }
            None => {
                log_playback_error(
                    &PlaybackError::EngineCreateFailed {
                        reason: format!("backend returned no handle for {}", params),
                    },
                    "create",
                );
                false
            }
        }
    }

    pub fn set_sample_rate(&self, sample_rate_hz: u32) {
        self.with_engine("set_sample_rate", |backend, engine| {
            backend.set_sample_rate(&engine.handle, sample_rate_hz);
            engine.params.sample_rate_hz = sample_rate_hz;
        });
    }

    pub fn set_channel_count(&self, channel_count: u16) {
        self.with_engine("set_channel_count", |backend, engine| {
            backend.set_channel_count(&engine.handle, channel_count);
            engine.params.channel_count = channel_count;
        });
    }

    /// Bind `source` to the engine. A new prepare supersedes the previous
    /// source and stops playback.
    pub fn prepare(&self, source: impl AsRef<Path>) {
        let source = source.as_ref();
        self.with_engine("prepare", |backend, engine| {
            backend.prepare(&engine.handle, source);
            engine.phase = PlaybackState::Prepared;
        });
    }

    /// Start playback of `region`. The call is forwarded even when nothing
    /// has been prepared; the engine decides what that means.
    pub fn play(&self, region: PlaybackRegion) {
        self.with_engine("play", |backend, engine| {
            backend.play(&engine.handle, region);
            match engine.phase {
                PlaybackState::Prepared | PlaybackState::Playing => {
                    engine.phase = PlaybackState::Playing;
                }
                _ => warn!(
                    "[PlaybackController] play({}, {}) on {} without a prepared source",
                    region.offset, region.size, engine.handle
                ),
            }
        });
    }

    /// Set the absolute playback shift in milliseconds.
    pub fn set_playback_shift(&self, shift_millis: i64) {
        self.with_engine("set_playback_shift", |backend, engine| {
            backend.set_playback_shift(&engine.handle, shift_millis);
        });
    }

    pub fn current_position_millis(&self) -> i64 {
        self.with_engine("current_position_millis", |backend, engine| {
            backend.current_position_millis(&engine.handle)
        })
        .unwrap_or(0)
    }

    pub fn total_patch_millis(&self) -> i64 {
        self.with_engine("total_patch_millis", |backend, engine| {
            backend.total_patch_millis(&engine.handle)
        })
        .unwrap_or(0)
    }

    pub fn current_output_latency_millis(&self) -> f64 {
        self.with_engine("current_output_latency_millis", |backend, engine| {
            backend.current_output_latency_millis(&engine.handle)
        })
        .unwrap_or(0.0)
    }

    /// Destroy the live engine, if any. The handle is cleared regardless of
    /// what the backend does with it.
    pub fn delete(&self) {
        if let Some(mut guard) = self.lock_state("delete") {
            Self::delete_locked(&mut guard);
        }
    }

    /// Every query answered under one lock, so a concurrent `delete` can
    /// never produce a status mixing two engine states.
    pub fn status(&self) -> PlaybackStatus {
        self.with_engine("status", |backend, engine| PlaybackStatus {
            position_millis: backend.current_position_millis(&engine.handle),
            total_patch_millis: backend.total_patch_millis(&engine.handle),
            latency_millis: backend.current_output_latency_millis(&engine.handle),
            state: engine.phase,
        })
        .unwrap_or_else(PlaybackStatus::idle)
    }

    pub fn state(&self) -> PlaybackState {
        self.lock_state("state")
            .and_then(|guard| guard.engine.as_ref().map(|engine| engine.phase))
            .unwrap_or(PlaybackState::Uninitialized)
    }

    /// Parameters of the live engine
    pub fn stream_parameters(&self) -> Option<StreamParameters> {
        self.lock_state("stream_parameters")
            .and_then(|guard| guard.engine.as_ref().map(|engine| engine.params))
    }

    pub fn is_live(&self) -> bool {
        self.state() != PlaybackState::Uninitialized
    }

    // ========================================================================
    // PRIVATE HELPER METHODS
    // ========================================================================

    fn delete_locked(state: &mut ControllerState<B>) {
        if let Some(engine) = state.engine.take() {
            state.backend.delete_engine(&engine.handle);
            info!("[PlaybackController] Deleted {}", engine.handle);
        }
    }

    /// Run `op` against the live engine; `None` when there is none. A stream
    /// the device dropped is reopened first.
    fn with_engine<R>(
        &self,
        context: &str,
        op: impl FnOnce(&mut B, &mut LiveEngine) -> R,
    ) -> Option<R> {
        let mut guard = self.lock_state(context)?;
        let ControllerState { backend, engine } = &mut *guard;
        match engine {
            Some(engine) => {
                backend.recover_stream(&engine.handle);
                Some(op(backend, engine))
            }
            None => {
                debug!("[PlaybackController] {} ignored: no live engine", context);
                None
            }
        }
    }

    /// Acquire the state lock; a poisoned lock is logged and treated as
    /// "no engine".
    fn lock_state(&self, context: &str) -> Option<MutexGuard<'_, ControllerState<B>>> {
        match self.state.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                log_playback_error(
                    &PlaybackError::LockPoisoned {
                        component: "playback_controller".to_string(),
                    },
                    context,
                );
                None
            }
        }
    }
}

impl<B: PlaybackBackend> Drop for PlaybackController<B> {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::delete_locked(state);
    }
}
