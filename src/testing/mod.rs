//! Testability harness utilities.
//!
//! The real backends need audio hardware. [`RecordingBackend`] stands in for
//! them where only the controller's call ordering matters; it records every
//! engine call. [`HeadlessBackend`] runs the real render path and lets tests
//! pull frames by hand through [`HeadlessOutput`].

mod headless;
mod recording;

pub use headless::{HeadlessBackend, HeadlessOutput};
pub use recording::{BackendCall, CallLog, RecordingBackend};
