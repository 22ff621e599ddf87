//! Configuration management for stream negotiation and engine tuning
//!
//! Values are loaded from a JSON file at startup, so fallbacks and polling
//! cadence can be adjusted without recompiling. Missing or malformed files
//! fall back to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::clock::DEFAULT_LATENCY_MS;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub stream: StreamDefaults,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Stream parameters used when the host cannot report its own
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamDefaults {
    /// Sample rate used when the host does not report one
    pub fallback_sample_rate: u32,
    /// Output channel count (the host never reports this)
    pub channel_count: u16,
    /// Frames per burst used when the host does not report one
    pub fallback_frames_per_burst: u32,
}

impl Default for StreamDefaults {
    fn default() -> Self {
        Self {
            fallback_sample_rate: 48000,
            channel_count: 2,
            fallback_frames_per_burst: 192,
        }
    }
}

/// Engine backend tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Latency assumed while the output stream cannot report one
    pub default_latency_ms: f64,
    /// Capacity of the control -> render command queue
    pub command_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_latency_ms: DEFAULT_LATENCY_MS,
            command_queue_capacity: 64,
        }
    }
}

/// Playback status polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between position/latency polls
    pub poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// Loaded configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Configuration for Android builds
    ///
    /// The APK carries no config file; stream values come from the device.
    #[cfg(target_os = "android")]
    pub fn load_android() -> Self {
        log::info!("[Config] Using default configuration on Android");
        Self::default()
    }

    /// Load configuration for non-Android platforms
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/playback_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "timeshift_player_{}_{}.json",
            name,
            std::process::id()
        ))
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.stream.fallback_sample_rate, 48000);
        assert_eq!(config.stream.channel_count, 2);
        assert_eq!(config.stream.fallback_frames_per_burst, 192);
        assert_eq!(config.engine.default_latency_ms, 120.0);
        assert_eq!(config.monitor.poll_interval_ms, 1000);
    }

    #[test]
    fn test_partial_json_keeps_other_sections() {
        let json = r#"{"monitor":{"poll_interval_ms":250}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.monitor.poll_interval_ms, 250);
        assert_eq!(config.stream.channel_count, 2);
    }

    #[test]
    fn test_partial_section_fills_missing_fields() {
        let json = r#"{"engine":{"default_latency_ms":80.0}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.engine.default_latency_ms, 80.0);
        assert_eq!(config.engine.command_queue_capacity, 64);
    }

    #[test]
    fn test_load_from_file_reads_values() {
        let path = temp_config_path("valid");
        fs::write(
            &path,
            r#"{"stream":{"fallback_sample_rate":44100,"channel_count":1,"fallback_frames_per_burst":256}}"#,
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path);
        assert_eq!(config.stream.fallback_sample_rate, 44100);
        assert_eq!(config.stream.channel_count, 1);
        assert_eq!(config.stream.fallback_frames_per_burst, 256);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_from_file_falls_back_on_invalid_json() {
        let path = temp_config_path("invalid");
        fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from_file(&path);
        assert_eq!(config.stream.fallback_sample_rate, 48000);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = AppConfig::load_from_file(temp_config_path("missing"));
        assert_eq!(config.engine.command_queue_capacity, 64);
    }
}
