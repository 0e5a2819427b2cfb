//! ROCm/HIP runtime backend
//!
//! Compiled only with the `rocm` feature; links `amdhip64`.

mod ffi;
mod runtime;

pub use runtime::HipRuntime;
