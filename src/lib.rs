//! hipmem - device memory layer for ROCm/HIP
//!
//! Typed device allocation with optional byte accounting, a pluggable allocator
//! for tracked allocations, and host/device copies and fills in blocking and
//! stream-ordered forms. Every runtime failure surfaces as a [`HipError`] that
//! names the failing call and its source location.
//!
//! Without the `rocm` feature the crate runs on a host-emulated device runtime,
//! which is what the test suite exercises.

#![allow(clippy::missing_safety_doc)] // Raw runtime bindings documented at module level

#[macro_use]
mod check;

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod profiling;
pub mod transfer;

pub use backend::{runtime, DeviceRuntime, HipStream, RuntimeStats, RuntimeStatus, Stream};
pub use config::MemoryConfig;
pub use error::{HipError, HipResult};
pub use logging::init_logging_default;
pub use memory::{
    allocate, clear_allocator, deallocate, install_allocator, install_allocator_fns,
    installed_allocator_name, tracked_allocate, tracked_deallocate, DeviceAllocator, DevicePtr,
};
pub use profiling::{range_start, range_stop, ScopedRange};
pub use transfer::{
    copy_device_to_host, copy_device_to_host_sync, copy_host_to_device, copy_host_to_device_sync,
    fill_bytes, fill_bytes_sync, zero_fill, zero_fill_sync,
};
