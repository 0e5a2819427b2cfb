use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=ROCM_PATH");
    println!("cargo:rerun-if-changed=build.rs");

    // Without `rocm` the crate runs on the emulated host runtime and links nothing.
    if env::var_os("CARGO_FEATURE_ROCM").is_none() {
        return;
    }

    let rocm_root = env::var("ROCM_PATH").unwrap_or_else(|_| "/opt/rocm".to_string());
    println!("cargo:rustc-link-search=native={}/lib", rocm_root);
    println!("cargo:rustc-link-lib=dylib=amdhip64");

    if env::var_os("CARGO_FEATURE_ROCTX").is_some() {
        println!("cargo:rustc-link-lib=dylib=roctx64");
    }

    let hip_header = format!("{}/include/hip/hip_runtime_api.h", rocm_root);
    if !std::path::Path::new(&hip_header).exists() {
        println!(
            "cargo:warning=HIP header not found at {}, linking may fail (set ROCM_PATH)",
            hip_header
        );
    }
}
