//! Desktop host properties read from the default cpal output device.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::SupportedBufferSize;

use super::{HostAudioProperties, HostProperty};
use crate::error::{log_playback_error, PlaybackError};

/// Reports the default output device's native sample rate and the smallest
/// buffer size it accepts.
#[derive(Debug, Default)]
pub struct CpalHostProperties {
    _unit: (),
}

impl CpalHostProperties {
    pub fn new() -> Self {
        Self::default()
    }

    fn default_output_config(&self) -> Result<cpal::SupportedStreamConfig, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::HostQueryFailed {
                property: "default_output_device".to_string(),
                reason: "No default output device found".to_string(),
            })?;
        device
            .default_output_config()
            .map_err(|e| PlaybackError::HostQueryFailed {
                property: "default_output_config".to_string(),
                reason: format!("{:?}", e),
            })
    }
}

impl HostAudioProperties for CpalHostProperties {
    fn property(&self, property: HostProperty) -> Option<String> {
        let config = match self.default_output_config() {
            Ok(config) => config,
            Err(err) => {
                log_playback_error(&err, "cpal_host_property");
                return None;
            }
        };

        match property {
            HostProperty::OutputSampleRate => Some(config.sample_rate().0.to_string()),
            HostProperty::OutputFramesPerBuffer => match config.buffer_size() {
                SupportedBufferSize::Range { min, .. } if *min > 0 => Some(min.to_string()),
                _ => None,
            },
        }
    }
}
