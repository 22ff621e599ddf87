//! End-to-end playback through the real render path, with frames pulled by
//! hand instead of by an audio device.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use timeshift_player::config::{EngineConfig, StreamDefaults};
use timeshift_player::host::FixedHostProperties;
use timeshift_player::managers::PlaybackController;
use timeshift_player::stream::{PlaybackRegion, PlaybackState, StreamParameters};
use timeshift_player::testing::{HeadlessBackend, HeadlessOutput};

/// Slack for the wall-clock time skipped on the first render after play
const SKIP_TOLERANCE_MS: i64 = 50;

/// Raw mono PCM where every sample holds its own index (mod i16)
fn write_ramp(name: &str, samples: usize) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "timeshift_headless_{}_{}.pcm",
        std::process::id(),
        name
    ));
    let bytes: Vec<u8> = (0..samples)
        .flat_map(|i| (i as i16).to_le_bytes())
        .collect();
    fs::write(&path, bytes).unwrap();
    path
}

/// Mono 1 kHz engine, so one sample is one millisecond
fn mono_controller() -> (PlaybackController<HeadlessBackend>, HeadlessOutput) {
    let config = EngineConfig {
        default_latency_ms: 0.0,
        command_queue_capacity: 16,
    };
    let (backend, output) = HeadlessBackend::new(config);
    let defaults = StreamDefaults {
        channel_count: 1,
        ..StreamDefaults::default()
    };
    let host = FixedHostProperties::new(Some(1000), Some(10));
    (
        PlaybackController::new(backend, Arc::new(host), defaults),
        output,
    )
}

fn assert_near(actual: i64, expected: i64) {
    assert!(
        actual >= expected && actual <= expected + SKIP_TOLERANCE_MS,
        "position {} not within [{}, {}]",
        actual,
        expected,
        expected + SKIP_TOLERANCE_MS
    );
}

#[test]
fn test_play_renders_region_from_offset() {
    let path = write_ramp("offset", 5000);
    let (controller, output) = mono_controller();

    assert!(controller.create());
    controller.prepare(&path);
    assert_eq!(controller.total_patch_millis(), 5000);

    controller.play(PlaybackRegion::new(1000, 5000));
    let rendered = output.render(500);

    assert_eq!(rendered.len(), 500);
    let first = rendered[0] as i64;
    assert_near(first, 1000);
    assert_eq!(rendered[1] as i64, first + 1);
    assert_near(controller.current_position_millis(), 1500);

    controller.delete();
    assert_eq!(output.live_streams(), 0);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_cursor_wraps_to_region_start() {
    let path = write_ramp("wrap", 5000);
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(&path);

    controller.play(PlaybackRegion::new(0, 2000));
    output.render(1900);
    let rendered = output.render(200);

    assert!(rendered.iter().any(|&sample| sample < 100));
    let position = controller.current_position_millis();
    assert!((0..2000).contains(&position));
    assert_near(position, 100);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_idle_engine_renders_silence() {
    let path = write_ramp("idle", 1000);
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(&path);

    let rendered = output.render(64);
    assert!(rendered.iter().all(|&sample| sample == 0));
    assert_eq!(controller.current_position_millis(), 0);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_shift_moves_position() {
    let path = write_ramp("shift", 5000);
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(&path);
    controller.play(PlaybackRegion::new(0, 5000));
    output.render(100);

    let before = controller.current_position_millis();
    controller.set_playback_shift(300);
    assert_eq!(controller.current_position_millis(), before + 300);

    let rendered = output.render(1);
    assert_eq!(rendered[0] as i64, before + 300);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_sample_rate_change_resumes_position() {
    let path = write_ramp("reopen", 5000);
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(&path);
    controller.play(PlaybackRegion::new(1000, 5000));
    output.render(500);
    let before = controller.current_position_millis();

    controller.set_sample_rate(2000);

    // Same samples now last half as long
    assert_eq!(controller.total_patch_millis(), 2500);
    let after = controller.current_position_millis();
    assert_near(after, before.rem_euclid(2500));
    let _ = fs::remove_file(&path);
}

#[test]
fn test_missing_source_keeps_engine_alive() {
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(std::env::temp_dir().join("timeshift_headless_missing.pcm"));
    controller.play(PlaybackRegion::new(0, 1000));

    assert_eq!(controller.total_patch_millis(), 0);
    assert!(output.render(32).iter().all(|&sample| sample == 0));
    assert_eq!(output.live_streams(), 1);
}

#[test]
fn test_region_larger_than_source_loops_source() {
    let path = write_ramp("clamp", 1000);
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(&path);

    controller.play(PlaybackRegion::new(0, 5000));
    let rendered = output.render(1200);

    assert!(rendered.windows(2).any(|pair| pair[1] < pair[0]));
    assert_near(controller.current_position_millis(), 200);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_channel_count_change_resumes_position() {
    let path = write_ramp("channels", 5000);
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(&path);
    controller.play(PlaybackRegion::new(1000, 5000));
    output.render(500);
    let before = controller.current_position_millis();

    controller.set_channel_count(2);

    // Same samples now hold half as many frames
    assert_eq!(controller.total_patch_millis(), 2500);
    assert_eq!(output.live_streams(), 1);
    assert_eq!(output.render(10).len(), 20);
    assert_near(controller.current_position_millis(), before.rem_euclid(2500) + 10);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_unsupported_channel_count_keeps_stream() {
    let path = write_ramp("bad_channels", 5000);
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(&path);
    controller.play(PlaybackRegion::new(0, 5000));

    controller.set_channel_count(3);

    assert_eq!(output.live_streams(), 1);
    assert_eq!(controller.total_patch_millis(), 5000);
    let rendered = output.render(10);
    assert_eq!(rendered.len(), 10);
    assert_eq!(rendered[1], rendered[0] + 1);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_extreme_shift_keeps_controller_usable() {
    let path = write_ramp("extreme_shift", 1000);
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(&path);
    controller.play(PlaybackRegion::new(0, 1000));

    controller.set_playback_shift(i64::MIN);
    controller.set_playback_shift(1);
    controller.set_playback_shift(i64::MAX);
    output.render(16);

    assert_eq!(controller.state(), PlaybackState::Playing);
    assert!((0..1000).contains(&controller.current_position_millis()));
    controller.delete();
    assert_eq!(output.live_streams(), 0);
    assert_eq!(controller.state(), PlaybackState::Uninitialized);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_extreme_region_keeps_controller_usable() {
    let path = write_ramp("extreme_region", 1000);
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(&path);
    controller.set_playback_shift(1);

    controller.play(PlaybackRegion::new(i64::MAX as u64, 1000));
    controller.play(PlaybackRegion::new(u64::MAX, u64::MAX));
    output.render(16);

    assert_eq!(controller.state(), PlaybackState::Playing);
    let position = controller.current_position_millis();
    assert!(position >= 0 && position <= controller.total_patch_millis());
    controller.delete();
    assert_eq!(output.live_streams(), 0);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_disconnected_stream_is_reopened() {
    let path = write_ramp("disconnect", 5000);
    let (controller, output) = mono_controller();
    controller.create();
    controller.prepare(&path);
    controller.play(PlaybackRegion::new(1000, 5000));
    output.render(500);
    let before = controller.current_position_millis();

    output.disconnect();
    assert_eq!(output.live_streams(), 0);

    // The next controller call notices the dropped stream
    let after = controller.current_position_millis();
    assert_eq!(output.live_streams(), 1);
    assert_near(after, before);
    assert_eq!(
        controller.stream_parameters(),
        Some(StreamParameters::new(1000, 1, 10))
    );

    let rendered = output.render(10);
    assert_eq!(rendered[1], rendered[0] + 1);
    assert_eq!(controller.state(), PlaybackState::Playing);
    let _ = fs::remove_file(&path);
}
