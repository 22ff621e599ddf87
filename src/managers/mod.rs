// Managers Module
//
// Each manager handles one specific concern:
// - PlaybackController: engine lifecycle and playback control
// - PlaybackMonitor: periodic status polling over a tokio broadcast channel

pub mod playback_controller;
pub mod playback_monitor;

pub use playback_controller::PlaybackController;
pub use playback_monitor::{PlaybackMonitor, PlaybackStatus};
