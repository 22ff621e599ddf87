//! Engine module housing the native playback backends.
//!
//! `backend` defines the handle-based `PlaybackBackend` contract the
//! controller drives, plus the Oboe (Android) and CPAL (desktop)
//! implementations built on the shared render core in `audio`.

pub mod backend;

pub use backend::{check_channel_count, EngineTable, PlaybackBackend, StreamHealth};

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        pub use backend::OboeBackend;

        /// Backend driving the device's audio output on this platform
        pub type PlatformBackend = OboeBackend;
    } else {
        pub use backend::CpalBackend;

        /// Backend driving the device's audio output on this platform
        pub type PlatformBackend = CpalBackend;
    }
}
