fn main() {
    println!("cargo:rerun-if-env-changed=TFLITE_LIB_DIR");
    // only the tflite feature needs the C API at link time
    if std::env::var_os("CARGO_FEATURE_VISION_TFLITE").is_none() {
        return;
    }
    if let Some(dir) = std::env::var_os("TFLITE_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
    }
    println!("cargo:rustc-link-lib=tensorflowlite_c");
}
