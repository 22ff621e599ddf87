// Error types for the time-shift playback engine
//
// The controller surface is fail-soft, so these errors never reach callers of
// `PlaybackController`. Backends produce them, log them with a stable code and
// swallow them at the controller boundary.

mod playback;

pub use playback::{log_playback_error, PlaybackError, PlaybackErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent logging across the JNI
/// boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
