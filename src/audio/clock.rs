//! Millisecond/frame/sample conversions for interleaved 16-bit streams.
//!
//! A frame holds one sample per channel. Sample counts are always kept a
//! multiple of the channel count so a cursor never lands between channels.

/// Latency assumed while the stream cannot report its own (ms)
pub const DEFAULT_LATENCY_MS: f64 = 120.0;

/// Frames covered by `millis` at `sample_rate`, truncated toward zero.
pub fn millis_to_frames(millis: f64, sample_rate: u32) -> i64 {
    (millis * sample_rate as f64 / 1000.0) as i64
}

/// Interleaved samples covered by `millis`, aligned to whole frames.
/// Saturates at the `i64` range.
pub fn millis_to_samples(millis: f64, sample_rate: u32, channel_count: u16) -> i64 {
    millis_to_frames(millis, sample_rate).saturating_mul(channel_count as i64)
}

pub fn frames_to_millis(frames: i64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 * 1000.0 / sample_rate as f64
}

pub fn samples_to_millis(samples: i64, sample_rate: u32, channel_count: u16) -> f64 {
    if channel_count == 0 {
        return 0.0;
    }
    frames_to_millis(samples / channel_count as i64, sample_rate)
}

/// Round `samples` down to a frame boundary.
pub fn align_to_frame(samples: usize, channel_count: usize) -> usize {
    if channel_count == 0 {
        return samples;
    }
    samples - samples % channel_count
}
