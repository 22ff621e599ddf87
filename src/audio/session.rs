//! Control-thread side of an engine.
//!
//! A `PlaybackSession` is paired with exactly one [`Renderer`]. It loads
//! sources, translates millisecond regions into sample commands, and answers
//! position/latency queries from the renderer's published stats.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use rtrb::{Consumer, Producer, RingBuffer};

use super::clock::{frames_to_millis, millis_to_samples, samples_to_millis};
use super::renderer::{RenderCommand, RenderStats, Renderer};
use super::source::PcmSource;
use crate::config::EngineConfig;
use crate::error::PlaybackError;
use crate::stream::{PlaybackRegion, StreamParameters};

/// What a reopened stream needs to continue where the old one stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub source: PathBuf,
    pub region: Option<PlaybackRegion>,
    pub shift_millis: i64,
}

pub struct PlaybackSession {
    params: StreamParameters,
    commands: Producer<RenderCommand>,
    retired: Consumer<Box<PcmSource>>,
    stats: Arc<RenderStats>,
    source_path: Option<PathBuf>,
    source_samples: usize,
    region: Option<PlaybackRegion>,
    shift_millis: i64,
}

impl PlaybackSession {
    /// Create a session and the renderer its audio callback will own.
    pub fn new(params: StreamParameters, config: &EngineConfig) -> (Self, Renderer) {
        let capacity = config.command_queue_capacity.max(1);
        let (commands, command_rx) = RingBuffer::new(capacity);
        let (retired_tx, retired) = RingBuffer::new(capacity);
        let stats = Arc::new(RenderStats::new(config.default_latency_ms));

        let renderer = Renderer::new(
            command_rx,
            retired_tx,
            Arc::clone(&stats),
            params.sample_rate_hz,
            params.channel_count,
        );

        let session = Self {
            params,
            commands,
            retired,
            stats,
            source_path: None,
            source_samples: 0,
            region: None,
            shift_millis: 0,
        };
        (session, renderer)
    }

    pub fn params(&self) -> StreamParameters {
        self.params
    }

    /// Load `path` and bind it, superseding any previous source.
    ///
    /// On failure the previous binding stays in place.
    pub fn prepare(&mut self, path: &Path) -> Result<(), PlaybackError> {
        let source = PcmSource::load(path)?;
        if let Some(declared) = source.declared_channels() {
            if declared != self.params.channel_count {
                warn!(
                    "[Session] {} has {} channels, stream has {}; playing without remixing",
                    path.display(),
                    declared,
                    self.params.channel_count
                );
            }
        }

        let len = source.len();
        self.send(RenderCommand::Load(Box::new(source)))?;
        self.source_path = Some(path.to_path_buf());
        self.source_samples = len;
        self.region = None;
        Ok(())
    }

    /// Start rendering `region`. The current shift is applied on top of the
    /// region offset.
    pub fn play(&mut self, region: PlaybackRegion) -> Result<(), PlaybackError> {
        if self.source_path.is_none() {
            debug!("[Session] play without a prepared source renders silence");
        }
        let offset_ms = clamp_millis(region.offset).saturating_add(self.shift_millis);
        let loop_samples = self.loop_samples(region.size);
        let offset = self.to_samples(offset_ms);
        let offset_samples = if loop_samples > 0 {
            offset.rem_euclid(loop_samples as i64) as usize
        } else {
            offset.max(0) as usize
        };

        self.send(RenderCommand::Play {
            offset_samples,
            size_samples: self.to_samples(clamp_millis(region.size)).max(0) as usize,
            issued_at: Instant::now(),
        })?;
        self.region = Some(region);
        Ok(())
    }

    /// Set the absolute shift; only the change since the last call moves the
    /// cursor.
    pub fn set_playback_shift(&mut self, shift_millis: i64) -> Result<(), PlaybackError> {
        let delta = shift_millis.saturating_sub(self.shift_millis);
        self.shift_millis = shift_millis;
        if self.region.is_some() && delta != 0 {
            self.send(RenderCommand::Shift {
                delta_samples: self.to_samples(delta),
            })?;
        }
        Ok(())
    }

    pub fn current_position_millis(&self) -> i64 {
        let Some(region) = self.region else {
            return 0;
        };
        let cursor = Cursor {
            offset_millis: region.offset as f64,
            shift_millis: self.shift_millis as f64,
            skipped_millis: self.stats.skipped_millis() as f64,
            played_millis: frames_to_millis(
                self.stats.played_frames() as i64,
                self.params.sample_rate_hz,
            ),
            latency_millis: self.stats.latency_millis(),
            loop_millis: samples_to_millis(
                self.loop_samples(region.size) as i64,
                self.params.sample_rate_hz,
                self.params.channel_count,
            ),
        };
        cursor.position_millis()
    }

    pub fn total_patch_millis(&self) -> i64 {
        samples_to_millis(
            self.source_samples as i64,
            self.params.sample_rate_hz,
            self.params.channel_count,
        ) as i64
    }

    pub fn current_output_latency_millis(&self) -> f64 {
        self.stats.latency_millis()
    }

    pub fn resume_point(&self) -> Option<ResumePoint> {
        let source = self.source_path.clone()?;
        let region = self.region.map(|region| {
            // Resume from where the listener is now, minus the shift that
            // will be applied again by the new session.
            let position = self
                .current_position_millis()
                .saturating_sub(self.shift_millis);
            PlaybackRegion::new(position.max(0) as u64, region.size)
        });
        Some(ResumePoint {
            source,
            region,
            shift_millis: self.shift_millis,
        })
    }

    /// Replay a resume point captured from a previous session.
    pub fn resume(&mut self, point: &ResumePoint) -> Result<(), PlaybackError> {
        self.prepare(&point.source)?;
        self.shift_millis = point.shift_millis;
        if let Some(region) = point.region {
            self.play(region)?;
        }
        Ok(())
    }

    fn loop_samples(&self, size_millis: u64) -> usize {
        let requested = self.to_samples(clamp_millis(size_millis)).max(0) as usize;
        if requested == 0 {
            self.source_samples
        } else {
            requested.min(self.source_samples)
        }
    }

    fn to_samples(&self, millis: i64) -> i64 {
        millis_to_samples(
            millis as f64,
            self.params.sample_rate_hz,
            self.params.channel_count,
        )
    }

    fn send(&mut self, command: RenderCommand) -> Result<(), PlaybackError> {
        self.release_retired();
        self.commands
            .push(command)
            .map_err(|_| PlaybackError::CommandQueueFull)
    }

    fn release_retired(&mut self) {
        while let Ok(source) = self.retired.pop() {
            drop(source);
        }
    }
}

/// Region values beyond `i64::MAX` ms are treated as `i64::MAX`.
fn clamp_millis(millis: u64) -> i64 {
    i64::try_from(millis).unwrap_or(i64::MAX)
}

/// Inputs of the position estimate, all in milliseconds.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    offset_millis: f64,
    shift_millis: f64,
    skipped_millis: f64,
    played_millis: f64,
    latency_millis: f64,
    loop_millis: f64,
}

impl Cursor {
    /// Audible position: region offset plus everything that has left the
    /// speaker since play, wrapped to the loop length.
    fn position_millis(&self) -> i64 {
        let heard = (self.skipped_millis + self.played_millis - self.latency_millis).max(0.0);
        let position = (self.offset_millis + self.shift_millis + heard) as i64;
        let loop_millis = self.loop_millis as i64;
        if loop_millis > 0 {
            position.rem_euclid(loop_millis)
        } else {
            position.max(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_source(name: &str, samples: usize) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "timeshift_session_{}_{}.pcm",
            std::process::id(),
            name
        ));
        let bytes: Vec<u8> = (0..samples)
            .flat_map(|i| ((i % 1000) as i16).to_le_bytes())
            .collect();
        fs::write(&path, bytes).unwrap();
        path
    }

    fn session(sample_rate: u32, channels: u16) -> (PlaybackSession, Renderer) {
        let config = EngineConfig {
            default_latency_ms: 0.0,
            command_queue_capacity: 8,
        };
        PlaybackSession::new(StreamParameters::new(sample_rate, channels, 64), &config)
    }

    #[test]
    fn test_cursor_position_wraps() {
        let cursor = Cursor {
            offset_millis: 4000.0,
            shift_millis: 500.0,
            skipped_millis: 120.0,
            played_millis: 1000.0,
            latency_millis: 120.0,
            loop_millis: 5000.0,
        };
        assert_eq!(cursor.position_millis(), 500);
    }

    #[test]
    fn test_cursor_never_negative_before_first_render() {
        let cursor = Cursor {
            offset_millis: 0.0,
            shift_millis: 0.0,
            skipped_millis: 0.0,
            played_millis: 0.0,
            latency_millis: 120.0,
            loop_millis: 5000.0,
        };
        assert_eq!(cursor.position_millis(), 0);
    }

    #[test]
    fn test_negative_shift_wraps_backwards() {
        let cursor = Cursor {
            offset_millis: 100.0,
            shift_millis: -300.0,
            skipped_millis: 0.0,
            played_millis: 0.0,
            latency_millis: 0.0,
            loop_millis: 1000.0,
        };
        assert_eq!(cursor.position_millis(), 800);
    }

    #[test]
    fn test_queries_before_play_are_neutral() {
        let (session, _renderer) = session(1000, 1);
        assert_eq!(session.current_position_millis(), 0);
        assert_eq!(session.total_patch_millis(), 0);
        assert!(session.resume_point().is_none());
    }

    #[test]
    fn test_prepare_reports_total_patch() {
        let path = write_source("total", 96000);
        let (mut session, _renderer) = session(48000, 2);
        session.prepare(&path).unwrap();
        assert_eq!(session.total_patch_millis(), 1000);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_prepare_failure_keeps_previous_source() {
        let path = write_source("keep", 2000);
        let (mut session, _renderer) = session(1000, 1);
        session.prepare(&path).unwrap();

        let missing = std::env::temp_dir().join("timeshift_session_missing.pcm");
        assert!(session.prepare(&missing).is_err());
        assert_eq!(session.total_patch_millis(), 2000);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_position_tracks_rendered_audio() {
        let path = write_source("position", 5000);
        let (mut session, mut renderer) = session(1000, 1);
        session.prepare(&path).unwrap();
        session.play(PlaybackRegion::new(1000, 5000)).unwrap();

        let mut out = vec![0i16; 250];
        renderer.render(&mut out, |s| s);

        let position = session.current_position_millis();
        assert!(position >= 1250, "position {} includes rendered audio", position);
        assert!(position <= session.total_patch_millis());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_shift_is_absolute() {
        let path = write_source("shift", 5000);
        let (mut session, mut renderer) = session(1000, 1);
        session.prepare(&path).unwrap();
        session.play(PlaybackRegion::new(0, 5000)).unwrap();
        let mut out = vec![0i16; 1];
        renderer.render(&mut out, |s| s);

        session.set_playback_shift(300).unwrap();
        let first = session.current_position_millis();
        session.set_playback_shift(300).unwrap();
        assert_eq!(session.current_position_millis(), first);
        session.set_playback_shift(100).unwrap();
        assert_eq!(session.current_position_millis(), first - 200);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_extreme_shifts_saturate() {
        let path = write_source("extreme_shift", 1000);
        let (mut session, mut renderer) = session(1000, 1);
        session.prepare(&path).unwrap();
        session.play(PlaybackRegion::new(0, 1000)).unwrap();

        session.set_playback_shift(i64::MIN).unwrap();
        session.set_playback_shift(i64::MAX).unwrap();
        session.set_playback_shift(1).unwrap();
        let mut out = vec![0i16; 16];
        renderer.render(&mut out, |s| s);

        assert!((0..1000).contains(&session.current_position_millis()));
        assert!(session.resume_point().is_some());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_extreme_region_is_clamped() {
        let path = write_source("extreme_region", 1000);
        let (mut session, mut renderer) = session(1000, 1);
        session.prepare(&path).unwrap();
        session.set_playback_shift(1).unwrap();

        session.play(PlaybackRegion::new(u64::MAX, u64::MAX)).unwrap();
        let mut out = vec![0i16; 16];
        renderer.render(&mut out, |s| s);
        assert!((0..1000).contains(&session.current_position_millis()));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_resume_point_carries_source_and_region() {
        let path = write_source("resume", 5000);
        let (mut session, _renderer) = session(1000, 1);
        session.prepare(&path).unwrap();
        session.set_playback_shift(50).unwrap();
        session.play(PlaybackRegion::new(2000, 5000)).unwrap();

        let point = session.resume_point().unwrap();
        assert_eq!(point.source, path);
        assert_eq!(point.shift_millis, 50);
        assert_eq!(point.region, Some(PlaybackRegion::new(2000, 5000)));
        let _ = fs::remove_file(&path);
    }
}
