// Build script for the Android cdylib
//
// Oboe is a C++ library; the shared library must link against libc++_shared
// so symbols like __cxa_pure_virtual resolve on every ABI (arm/x86).

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }
}
