//! Value types shared by the controller and every engine backend.
//!
//! Region offsets, sizes and shifts are expressed in milliseconds of the
//! prepared source. Backends convert them to frames using the stream
//! parameters of the engine they belong to.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

/// Opaque identifier naming exactly one live engine instance.
///
/// A handle can only be built from a non-zero raw value, so the "absent"
/// state is `Option<EngineHandle>::None` rather than a zero sentinel. Handles
/// are deliberately neither `Clone` nor `Copy`: the controller owns the only
/// copy and lends it to the backend by reference.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EngineHandle(NonZeroU64);

impl EngineHandle {
    /// Wrap a raw backend identifier; `0` means the backend failed.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn as_raw(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Stream geometry handed to the engine constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParameters {
    /// Output sample rate in Hz
    pub sample_rate_hz: u32,
    /// Interleaved channel count (1 or 2)
    pub channel_count: u16,
    /// Hardware-preferred callback size in frames
    pub frames_per_burst: u32,
}

impl StreamParameters {
    pub fn new(sample_rate_hz: u32, channel_count: u16, frames_per_burst: u32) -> Self {
        Self {
            sample_rate_hz,
            channel_count,
            frames_per_burst,
        }
    }
}

impl fmt::Display for StreamParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {} frames/burst",
            self.sample_rate_hz, self.channel_count, self.frames_per_burst
        )
    }
}

/// Bounded slice of the prepared source rendered by a `play` call.
///
/// The cursor starts at `offset` and wraps back to the start of the source
/// once it reaches `size`. A `size` of zero loops over the whole source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackRegion {
    /// Start position in milliseconds
    pub offset: u64,
    /// Loop length in milliseconds
    pub size: u64,
}

impl PlaybackRegion {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }
}

/// Lifecycle state of the controller's engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No engine exists
    Uninitialized,
    /// Engine exists, no source bound
    Created,
    /// Source bound, not rendering
    Prepared,
    /// Audio is rendering
    Playing,
}
