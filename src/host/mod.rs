//! Host audio-property queries and stream-parameter negotiation.
//!
//! The host reports the output sample rate and frames-per-burst it prefers;
//! matching them keeps the engine on the platform's fast path. The channel
//! count is never reported by the host and always comes from configuration.

use log::{debug, warn};

use crate::config::StreamDefaults;
use crate::engine::backend::MAX_CHANNEL_COUNT;
use crate::stream::StreamParameters;

#[cfg(target_os = "android")]
mod android;
#[cfg(target_os = "android")]
pub use android::AndroidHostProperties;

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use self::cpal::CpalHostProperties;

/// Properties the controller asks the host about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostProperty {
    OutputSampleRate,
    OutputFramesPerBuffer,
}

impl HostProperty {
    /// Key understood by `android.media.AudioManager.getProperty`
    pub fn key(&self) -> &'static str {
        match self {
            HostProperty::OutputSampleRate => "android.media.property.OUTPUT_SAMPLE_RATE",
            HostProperty::OutputFramesPerBuffer => {
                "android.media.property.OUTPUT_FRAMES_PER_BUFFER"
            }
        }
    }
}

/// Host audio subsystem query capability.
///
/// Values are returned as the host reports them (strings on Android);
/// `None` means the host has no answer.
pub trait HostAudioProperties: Send + Sync {
    fn property(&self, property: HostProperty) -> Option<String>;
}

/// Host that reports fixed values. Used by tests and CLI overrides.
#[derive(Debug, Clone, Default)]
pub struct FixedHostProperties {
    sample_rate: Option<u32>,
    frames_per_buffer: Option<u32>,
}

impl FixedHostProperties {
    pub fn new(sample_rate: Option<u32>, frames_per_buffer: Option<u32>) -> Self {
        Self {
            sample_rate,
            frames_per_buffer,
        }
    }
}

impl HostAudioProperties for FixedHostProperties {
    fn property(&self, property: HostProperty) -> Option<String> {
        let value = match property {
            HostProperty::OutputSampleRate => self.sample_rate,
            HostProperty::OutputFramesPerBuffer => self.frames_per_buffer,
        };
        value.map(|v| v.to_string())
    }
}

/// Build the stream parameters passed to the engine constructor.
///
/// Sample rate and frames-per-burst come from the host, falling back to the
/// configured values when the host is silent or reports garbage. Channel
/// count comes from configuration, clamped to mono/stereo.
pub fn negotiate(host: &dyn HostAudioProperties, defaults: &StreamDefaults) -> StreamParameters {
    let sample_rate_hz = query_positive(
        host,
        HostProperty::OutputSampleRate,
        defaults.fallback_sample_rate,
    );
    let frames_per_burst = query_positive(
        host,
        HostProperty::OutputFramesPerBuffer,
        defaults.fallback_frames_per_burst,
    );
    let channel_count = defaults.channel_count.clamp(1, MAX_CHANNEL_COUNT);

    let params = StreamParameters::new(sample_rate_hz, channel_count, frames_per_burst);
    debug!("[Host] Negotiated stream parameters: {}", params);
    params
}

fn query_positive(host: &dyn HostAudioProperties, property: HostProperty, fallback: u32) -> u32 {
    match host.property(property) {
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(value) if value > 0 => value,
            _ => {
                warn!(
                    "[Host] Unusable value {:?} for {}, using {}",
                    raw,
                    property.key(),
                    fallback
                );
                fallback
            }
        },
        None => {
            warn!("[Host] {} not reported, using {}", property.key(), fallback);
            fallback
        }
    }
}
