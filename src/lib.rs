// Time-shift Player Core - Rust Playback Engine
// Low-latency looping playback with a lock-free render path

// Module declarations
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod managers;
pub mod stream;
pub mod testing;
pub mod timeshift;

#[cfg(target_os = "android")]
mod jni_bridge;

// Re-exports for convenience
pub use config::AppConfig;
pub use engine::PlaybackBackend;
pub use error::{ErrorCode, PlaybackError};
pub use managers::{PlaybackController, PlaybackMonitor, PlaybackStatus};
pub use stream::{EngineHandle, PlaybackRegion, PlaybackState, StreamParameters};

/// Initialize Android logging
#[cfg(target_os = "android")]
fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("TimeshiftPlayer"),
    );
}

/// JNI_OnLoad is called when the native library is loaded by Android.
///
/// Logging is set up and the VM is kept for the bridge. The application
/// context needed by Oboe only exists once Java calls
/// `PlaybackEngine.initialize(Context)`, which registers both with
/// `ndk_context`.
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging();
    log::info!("JNI_OnLoad called - native playback library loaded");
    jni_bridge::keep_vm(vm);
    jni::sys::JNI_VERSION_1_6
}
