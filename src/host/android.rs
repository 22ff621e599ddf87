//! `AudioManager.getProperty` over JNI.

use jni::objects::{JObject, JString, JValue};
use jni::{JNIEnv, JavaVM};

use super::{HostAudioProperties, HostProperty};
use crate::error::{log_playback_error, PlaybackError};

/// Queries the Android audio service through the application context
/// registered with `ndk_context` in `JNI_OnLoad`.
#[derive(Debug, Default)]
pub struct AndroidHostProperties {
    _unit: (),
}

impl AndroidHostProperties {
    pub fn new() -> Self {
        Self::default()
    }

    fn query(&self, key: &str) -> Result<Option<String>, jni::errors::Error> {
        let ctx = ndk_context::android_context();
        // SAFETY: ndk_context hands out the VM pointer installed by JNI_OnLoad,
        // which stays valid for the life of the process.
        let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }?;
        let mut env = vm.attach_current_thread()?;
        // SAFETY: the context is a global reference owned by the Android runtime.
        let context = unsafe { JObject::from_raw(ctx.context().cast()) };

        let audio_manager = audio_manager(&mut env, &context)?;
        let key = env.new_string(key)?;
        let value = env
            .call_method(
                &audio_manager,
                "getProperty",
                "(Ljava/lang/String;)Ljava/lang/String;",
                &[JValue::Object(&key)],
            )?
            .l()?;

        if value.is_null() {
            return Ok(None);
        }
        let value = JString::from(value);
        let value: String = env.get_string(&value)?.into();
        Ok(Some(value))
    }
}

fn audio_manager<'local>(
    env: &mut JNIEnv<'local>,
    context: &JObject<'_>,
) -> Result<JObject<'local>, jni::errors::Error> {
    let service_name = env
        .get_static_field(
            "android/content/Context",
            "AUDIO_SERVICE",
            "Ljava/lang/String;",
        )?
        .l()?;
    env.call_method(
        context,
        "getSystemService",
        "(Ljava/lang/String;)Ljava/lang/Object;",
        &[JValue::Object(&service_name)],
    )?
    .l()
}

impl HostAudioProperties for AndroidHostProperties {
    fn property(&self, property: HostProperty) -> Option<String> {
        match self.query(property.key()) {
            Ok(value) => value,
            Err(err) => {
                log_playback_error(
                    &PlaybackError::HostQueryFailed {
                        property: property.key().to_string(),
                        reason: err.to_string(),
                    },
                    "android_host_property",
                );
                None
            }
        }
    }
}
