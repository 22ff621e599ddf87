//! Render-thread side of an engine: copies the prepared source into the
//! output stream.
//!
//! # Real-Time Safety
//! `render_with` runs inside the platform audio callback:
//! - Commands arrive through a lock-free SPSC queue (rtrb)
//! - Replaced sources are handed back to the control thread, never freed here
//! - Stats are published with relaxed atomics
//!
//! # Architecture
//! ```text
//! PlaybackSession (control thread)
//!   ├─> RenderCommand ──rtrb──> Renderer::render_with() [audio thread]
//!   ├─< Box<PcmSource> <─rtrb── (retired sources)
//!   └─< RenderStats (atomics)
//! ```

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rtrb::{Consumer, Producer};

use super::clock::{align_to_frame, millis_to_samples};
use super::source::PcmSource;

/// Commands sent from the control thread to the render thread.
pub enum RenderCommand {
    /// Replace the bound source and stop rendering
    Load(Box<PcmSource>),
    /// Start rendering at `offset_samples`, looping over `size_samples`
    Play {
        offset_samples: usize,
        size_samples: usize,
        issued_at: Instant,
    },
    /// Move the cursor without interrupting playback
    Shift { delta_samples: i64 },
}

/// Counters published by the render thread.
pub struct RenderStats {
    /// Frames rendered from the source since the last `Play`
    played_frames: AtomicU64,
    /// Frames of silence written while idle
    empty_frames: AtomicU64,
    /// Milliseconds skipped on the first render after `Play`
    skipped_millis: AtomicI64,
    /// Last measured output latency (f64 bits)
    latency_bits: AtomicU64,
    default_latency_ms: f64,
}

impl RenderStats {
    pub fn new(default_latency_ms: f64) -> Self {
        Self {
            played_frames: AtomicU64::new(0),
            empty_frames: AtomicU64::new(0),
            skipped_millis: AtomicI64::new(0),
            latency_bits: AtomicU64::new(default_latency_ms.to_bits()),
            default_latency_ms,
        }
    }

    pub fn played_frames(&self) -> u64 {
        self.played_frames.load(Ordering::Relaxed)
    }

    pub fn empty_frames(&self) -> u64 {
        self.empty_frames.load(Ordering::Relaxed)
    }

    pub fn skipped_millis(&self) -> i64 {
        self.skipped_millis.load(Ordering::Relaxed)
    }

    pub fn latency_millis(&self) -> f64 {
        f64::from_bits(self.latency_bits.load(Ordering::Relaxed))
    }

    /// Store the stream's latency estimate; `None` or a negative value
    /// restores the configured default.
    pub fn record_latency(&self, latency_ms: Option<f64>) {
        let value = match latency_ms {
            Some(ms) if ms.is_finite() && ms >= 0.0 => ms,
            _ => self.default_latency_ms,
        };
        self.latency_bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Owned by the audio callback of a cpal or Oboe stream.
pub struct Renderer {
    commands: Consumer<RenderCommand>,
    retired: Producer<Box<PcmSource>>,
    stats: Arc<RenderStats>,
    sample_rate: u32,
    channel_count: usize,
    source: Option<Box<PcmSource>>,
    /// Next sample index to read
    position: usize,
    /// Cursor wraps to zero at this sample index
    loop_len: usize,
    playing: bool,
    pending_start: Option<Instant>,
}

impl Renderer {
    pub fn new(
        commands: Consumer<RenderCommand>,
        retired: Producer<Box<PcmSource>>,
        stats: Arc<RenderStats>,
        sample_rate: u32,
        channel_count: u16,
    ) -> Self {
        Self {
            commands,
            retired,
            stats,
            sample_rate,
            channel_count: channel_count.max(1) as usize,
            source: None,
            position: 0,
            loop_len: 0,
            playing: false,
            pending_start: None,
        }
    }

    pub fn record_latency(&self, latency_ms: Option<f64>) {
        self.stats.record_latency(latency_ms);
    }

    /// Render into an interleaved buffer, converting each sample.
    pub fn render<T: Copy>(&mut self, out: &mut [T], convert: impl Fn(i16) -> T) {
        let frames = out.len() / self.channel_count;
        self.render_with(frames, |index, sample| out[index] = convert(sample));
    }

    /// Render `frame_count` frames, calling `write(sample_index, value)` for
    /// every interleaved sample in order.
    pub fn render_with(&mut self, frame_count: usize, mut write: impl FnMut(usize, i16)) {
        self.drain_commands();

        let sample_count = frame_count * self.channel_count;
        let samples = match self.source.as_deref() {
            Some(source) if self.playing && self.loop_len > 0 => source.samples(),
            _ => {
                for index in 0..sample_count {
                    write(index, 0);
                }
                self.stats
                    .empty_frames
                    .fetch_add(frame_count as u64, Ordering::Relaxed);
                return;
            }
        };

        // First render after play: skip what elapsed since the call plus the
        // output latency so the audible cursor matches wall-clock time.
        if let Some(issued_at) = self.pending_start.take() {
            let delay_ms = issued_at.elapsed().as_secs_f64() * 1000.0;
            let skip_ms = delay_ms + self.stats.latency_millis();
            let skip = millis_to_samples(skip_ms, self.sample_rate, self.channel_count as u16)
                .max(0) as usize;
            self.position = align_to_frame(
                (self.position + skip % self.loop_len) % self.loop_len,
                self.channel_count,
            );
            self.stats
                .skipped_millis
                .store(skip_ms as i64, Ordering::Relaxed);
        }

        for index in 0..sample_count {
            write(index, samples[self.position]);
            self.position += 1;
            if self.position >= self.loop_len {
                self.position = 0;
            }
        }

        self.stats
            .played_frames
            .fetch_add(frame_count as u64, Ordering::Relaxed);
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                RenderCommand::Load(source) => {
                    self.playing = false;
                    self.pending_start = None;
                    self.position = 0;
                    self.loop_len = 0;
                    if let Some(old) = self.source.replace(source) {
                        self.retire(old);
                    }
                }
                RenderCommand::Play {
                    offset_samples,
                    size_samples,
                    issued_at,
                } => self.start(offset_samples, size_samples, issued_at),
                RenderCommand::Shift { delta_samples } => self.shift(delta_samples),
            }
        }
    }

    fn start(&mut self, offset_samples: usize, size_samples: usize, issued_at: Instant) {
        let source_len = self.source.as_ref().map_or(0, |s| s.len());
        let size = if size_samples == 0 {
            source_len
        } else {
            size_samples.min(source_len)
        };
        self.loop_len = align_to_frame(size, self.channel_count);
        self.position = if self.loop_len > 0 {
            align_to_frame(offset_samples % self.loop_len, self.channel_count)
        } else {
            0
        };
        self.playing = true;
        self.pending_start = Some(issued_at);
        self.stats.played_frames.store(0, Ordering::Relaxed);
        self.stats.skipped_millis.store(0, Ordering::Relaxed);
    }

    fn shift(&mut self, delta_samples: i64) {
        if !self.playing || self.loop_len == 0 {
            return;
        }
        let loop_len = self.loop_len as i64;
        // Both terms are below loop_len, so the sum cannot overflow
        let moved = (self.position as i64 + delta_samples.rem_euclid(loop_len)) % loop_len;
        self.position = align_to_frame(moved as usize, self.channel_count);
    }

    fn retire(&mut self, source: Box<PcmSource>) {
        // The queue is sized like the command queue, so a full queue means
        // the control thread stopped draining; dropping here is the last resort.
        if let Err(rtrb::PushError::Full(source)) = self.retired.push(source) {
            drop(source);
        }
    }
}
