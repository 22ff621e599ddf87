//! JNI surface for the Java `com.timeshift.player.PlaybackEngine` class.
//!
//! Java holds no engine handle: the process-wide controller below owns it and
//! every entry point is fail-soft, exactly like the controller itself.
//! Negative numbers coming from Java are ignored with a warning.

use std::sync::Arc;

use jni::objects::{GlobalRef, JClass, JObject, JString};
use jni::sys::{jboolean, jdouble, jint, jlong, JNI_FALSE, JNI_TRUE};
use jni::{JNIEnv, JavaVM};
use log::{info, warn};
use once_cell::sync::{Lazy, OnceCell};

use crate::config::AppConfig;
use crate::engine::OboeBackend;
use crate::error::{log_playback_error, PlaybackError};
use crate::host::AndroidHostProperties;
use crate::managers::PlaybackController;
use crate::stream::PlaybackRegion;

static CONTROLLER: Lazy<PlaybackController<OboeBackend>> = Lazy::new(|| {
    let config = AppConfig::load_android();
    PlaybackController::new(
        OboeBackend::new(config.engine),
        Arc::new(AndroidHostProperties::new()),
        config.stream,
    )
});

/// VM handed to `JNI_OnLoad`
static JAVA_VM: OnceCell<JavaVM> = OnceCell::new();

/// Application context registered with `ndk_context`, kept alive for the
/// life of the process
static APP_CONTEXT: OnceCell<GlobalRef> = OnceCell::new();

pub(crate) fn keep_vm(vm: JavaVM) {
    if JAVA_VM.set(vm).is_err() {
        warn!("JNI_OnLoad ran twice; keeping the first VM");
    }
}

/// `static native void initialize(Context context)`
///
/// Must run once before `create`; later calls are ignored.
#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_initialize(
    env: JNIEnv,
    _class: JClass,
    context: JObject,
) {
    let result = APP_CONTEXT.get_or_try_init(|| -> Result<GlobalRef, jni::errors::Error> {
        let global = env.new_global_ref(&context)?;
        // Normally kept by JNI_OnLoad
        let vm = JAVA_VM.get_or_try_init(|| env.get_java_vm())?;
        // SAFETY: the VM in JAVA_VM and the global reference in APP_CONTEXT
        // both stay valid for the life of the process.
        unsafe {
            ndk_context::initialize_android_context(
                vm.get_java_vm_pointer().cast(),
                global.as_obj().as_raw().cast(),
            );
        }
        info!("Android context registered");
        Ok(global)
    });

    if let Err(err) = result {
        log_playback_error(
            &PlaybackError::HardwareError {
                details: format!("Failed to register Android context: {}", err),
            },
            "jni_initialize",
        );
    }
}

#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_create(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    if APP_CONTEXT.get().is_none() {
        warn!("PlaybackEngine.create called before initialize");
        return JNI_FALSE;
    }
    if CONTROLLER.create() {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_delete(
    _env: JNIEnv,
    _class: JClass,
) {
    CONTROLLER.delete();
}

#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_setSampleRate(
    _env: JNIEnv,
    _class: JClass,
    sample_rate: jint,
) {
    match u32::try_from(sample_rate) {
        Ok(rate) => CONTROLLER.set_sample_rate(rate),
        Err(_) => warn!("Ignoring negative sample rate {}", sample_rate),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_setChannelCount(
    _env: JNIEnv,
    _class: JClass,
    channel_count: jint,
) {
    match u16::try_from(channel_count) {
        Ok(count) => CONTROLLER.set_channel_count(count),
        Err(_) => warn!("Ignoring channel count {}", channel_count),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_prepare(
    mut env: JNIEnv,
    _class: JClass,
    path: JString,
) {
    match env.get_string(&path) {
        Ok(path) => {
            let path: String = path.into();
            CONTROLLER.prepare(path);
        }
        Err(err) => log_playback_error(
            &PlaybackError::SourceLoadFailed {
                path: String::from("<java string>"),
                reason: err.to_string(),
            },
            "jni_prepare",
        ),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_play(
    _env: JNIEnv,
    _class: JClass,
    offset: jlong,
    size: jlong,
) {
    match (u64::try_from(offset), u64::try_from(size)) {
        (Ok(offset), Ok(size)) => CONTROLLER.play(PlaybackRegion::new(offset, size)),
        _ => warn!("Ignoring play with negative region ({}, {})", offset, size),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_setPlaybackShift(
    _env: JNIEnv,
    _class: JClass,
    shift_millis: jlong,
) {
    CONTROLLER.set_playback_shift(shift_millis);
}

#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_getCurrentPositionMillis(
    _env: JNIEnv,
    _class: JClass,
) -> jlong {
    CONTROLLER.current_position_millis()
}

#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_getTotalPatchMillis(
    _env: JNIEnv,
    _class: JClass,
) -> jlong {
    CONTROLLER.total_patch_millis()
}

#[no_mangle]
pub extern "system" fn Java_com_timeshift_player_PlaybackEngine_getCurrentOutputLatencyMillis(
    _env: JNIEnv,
    _class: JClass,
) -> jdouble {
    CONTROLLER.current_output_latency_millis()
}
