//! In-memory PCM sources.
//!
//! Sources are loaded whole. The radio stream is a few minutes of decoded
//! 16-bit PCM and the render thread must never touch the filesystem.

use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::error::PlaybackError;

/// Interleaved 16-bit PCM held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmSource {
    samples: Box<[i16]>,
    /// Channel count declared by the file header, if it has one
    declared_channels: Option<u16>,
}

impl PcmSource {
    pub fn from_samples(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
            declared_channels: None,
        }
    }

    /// Load a source from disk.
    ///
    /// `.wav` files are decoded with hound and must hold 16-bit integer PCM.
    /// Anything else is read as headerless little-endian 16-bit PCM; a
    /// trailing odd byte is ignored.
    pub fn load(path: &Path) -> Result<Self, PlaybackError> {
        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));

        let source = if is_wav {
            Self::load_wav(path)?
        } else {
            Self::load_raw(path)?
        };

        debug!(
            "[Source] Loaded {} samples from {}",
            source.samples.len(),
            path.display()
        );
        Ok(source)
    }

    fn load_raw(path: &Path) -> Result<Self, PlaybackError> {
        let bytes = fs::read(path).map_err(|e| load_error(path, e.to_string()))?;
        if bytes.len() % 2 != 0 {
            warn!(
                "[Source] {} has an odd byte count, dropping the last byte",
                path.display()
            );
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self::from_samples(samples))
    }

    fn load_wav(path: &Path) -> Result<Self, PlaybackError> {
        let reader = hound::WavReader::open(path).map_err(|e| load_error(path, e.to_string()))?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(load_error(
                path,
                format!(
                    "unsupported WAV format {:?}/{} bits, expected 16-bit PCM",
                    spec.sample_format, spec.bits_per_sample
                ),
            ));
        }
        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| load_error(path, e.to_string()))?;

        Ok(Self {
            samples: samples.into_boxed_slice(),
            declared_channels: Some(spec.channels),
        })
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn declared_channels(&self) -> Option<u16> {
        self.declared_channels
    }
}

fn load_error(path: &Path, reason: String) -> PlaybackError {
    PlaybackError::SourceLoadFailed {
        path: path.display().to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("timeshift_source_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_load_raw_little_endian() {
        let path = temp_path("raw.pcm");
        fs::write(&path, [0x01, 0x00, 0xff, 0xff, 0x00, 0x80]).unwrap();

        let source = PcmSource::load(&path).unwrap();
        assert_eq!(source.samples(), &[1, -1, i16::MIN]);
        assert_eq!(source.declared_channels(), None);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_raw_ignores_trailing_byte() {
        let path = temp_path("odd.raw");
        fs::write(&path, [0x02, 0x00, 0x07]).unwrap();

        let source = PcmSource::load(&path).unwrap();
        assert_eq!(source.samples(), &[2]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_wav() {
        let path = temp_path("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [10i16, -10, 20, -20] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let source = PcmSource::load(&path).unwrap();
        assert_eq!(source.samples(), &[10, -10, 20, -20]);
        assert_eq!(source.declared_channels(), Some(2));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = PcmSource::load(&temp_path("missing.pcm")).unwrap_err();
        assert!(matches!(err, PlaybackError::SourceLoadFailed { .. }));
    }
}
