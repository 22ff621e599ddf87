// Playback error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Playback error code constants
///
/// Stable numeric codes so log lines emitted on Android and desktop can be
/// matched by the same tooling.
///
/// Error code range: 2001-2008
pub struct PlaybackErrorCodes {}

impl PlaybackErrorCodes {
    /// Engine constructor did not yield a handle
    pub const ENGINE_CREATE_FAILED: i32 = 2001;

    /// Failed to open the output stream
    pub const STREAM_OPEN_FAILED: i32 = 2002;

    /// Hardware or platform audio error
    pub const HARDWARE_ERROR: i32 = 2003;

    /// Source file could not be read or decoded
    pub const SOURCE_LOAD_FAILED: i32 = 2004;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 2005;

    /// Handle does not name a live engine in this backend
    pub const UNKNOWN_HANDLE: i32 = 2006;

    /// Render command queue is full
    pub const COMMAND_QUEUE_FULL: i32 = 2007;

    /// Host audio property query failed
    pub const HOST_QUERY_FAILED: i32 = 2008;
}

/// Log a playback error with structured context
///
/// Emits a single `error!` line carrying the numeric code, the component and
/// the call site that observed the failure.
pub fn log_playback_error(err: &PlaybackError, context: &str) {
    error!(
        "Playback error in {}: code={}, component=PlaybackEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Playback-related errors
///
/// These errors cover engine construction, stream management, source loading
/// and host queries. None of them cross the controller boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// Engine constructor did not yield a handle
    EngineCreateFailed { reason: String },

    /// Failed to open the output stream
    StreamOpenFailed { reason: String },

    /// Hardware or platform audio error
    HardwareError { details: String },

    /// Source file could not be read or decoded
    SourceLoadFailed { path: String, reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Handle does not name a live engine in this backend
    UnknownHandle { handle: u64 },

    /// Render command queue is full
    CommandQueueFull,

    /// Host audio property query failed
    HostQueryFailed { property: String, reason: String },
}

impl ErrorCode for PlaybackError {
    fn code(&self) -> i32 {
        match self {
            PlaybackError::EngineCreateFailed { .. } => PlaybackErrorCodes::ENGINE_CREATE_FAILED,
            PlaybackError::StreamOpenFailed { .. } => PlaybackErrorCodes::STREAM_OPEN_FAILED,
            PlaybackError::HardwareError { .. } => PlaybackErrorCodes::HARDWARE_ERROR,
            PlaybackError::SourceLoadFailed { .. } => PlaybackErrorCodes::SOURCE_LOAD_FAILED,
            PlaybackError::LockPoisoned { .. } => PlaybackErrorCodes::LOCK_POISONED,
            PlaybackError::UnknownHandle { .. } => PlaybackErrorCodes::UNKNOWN_HANDLE,
            PlaybackError::CommandQueueFull => PlaybackErrorCodes::COMMAND_QUEUE_FULL,
            PlaybackError::HostQueryFailed { .. } => PlaybackErrorCodes::HOST_QUERY_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            PlaybackError::EngineCreateFailed { reason } => {
                format!("Could not create playback engine: {}", reason)
            }
            PlaybackError::StreamOpenFailed { reason } => {
                format!("Failed to open output stream: {}", reason)
            }
            PlaybackError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            PlaybackError::SourceLoadFailed { path, reason } => {
                format!("Failed to load source {}: {}", path, reason)
            }
            PlaybackError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            PlaybackError::UnknownHandle { handle } => {
                format!("No live engine for handle {}", handle)
            }
            PlaybackError::CommandQueueFull => {
                "Render command queue is full, command dropped".to_string()
            }
            PlaybackError::HostQueryFailed { property, reason } => {
                format!("Host property {} unavailable: {}", property, reason)
            }
        }
    }
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlaybackError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PlaybackError {}

impl From<std::io::Error> for PlaybackError {
    fn from(err: std::io::Error) -> Self {
        PlaybackError::HardwareError {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_error_codes() {
        assert_eq!(
            PlaybackError::EngineCreateFailed {
                reason: "test".to_string()
            }
            .code(),
            PlaybackErrorCodes::ENGINE_CREATE_FAILED
        );
        assert_eq!(
            PlaybackError::SourceLoadFailed {
                path: "radio.pcm".to_string(),
                reason: "missing".to_string()
            }
            .code(),
            PlaybackErrorCodes::SOURCE_LOAD_FAILED
        );
        assert_eq!(
            PlaybackError::UnknownHandle { handle: 7 }.code(),
            PlaybackErrorCodes::UNKNOWN_HANDLE
        );
        assert_eq!(
            PlaybackError::CommandQueueFull.code(),
            PlaybackErrorCodes::COMMAND_QUEUE_FULL
        );
        assert_eq!(
            PlaybackError::HostQueryFailed {
                property: "sample_rate".to_string(),
                reason: "null".to_string()
            }
            .code(),
            PlaybackErrorCodes::HOST_QUERY_FAILED
        );
    }

    #[test]
    fn test_playback_error_messages() {
        let err = PlaybackError::SourceLoadFailed {
            path: "radio.pcm".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(err.message(), "Failed to load source radio.pcm: not found");

        let err = PlaybackError::UnknownHandle { handle: 42 };
        assert!(err.message().contains("42"));

        let err = PlaybackError::HardwareError {
            details: "device gone".to_string(),
        };
        assert_eq!(err.message(), "Hardware error: device gone");
    }

    #[test]
    fn test_playback_error_display() {
        let err = PlaybackError::CommandQueueFull;
        let display = format!("{}", err);
        assert!(display.contains("PlaybackError"));
        assert!(display.contains(&err.code().to_string()));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::other("test io error");
        let err: PlaybackError = io_err.into();
        match err {
            PlaybackError::HardwareError { details } => {
                assert!(details.contains("test io error"));
            }
            _ => panic!("Expected HardwareError"),
        }
    }
}
