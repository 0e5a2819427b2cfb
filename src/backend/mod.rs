//! Device runtime backends
//!
//! [`DeviceRuntime`] is the boundary to the accelerator runtime: raw allocate/free,
//! raw copies, memset and stream management. Nothing above this module talks to
//! the runtime except through it.
//!
//! - [`HipRuntime`] binds ROCm HIP (feature `rocm`).
//! - [`HostRuntime`] emulates a device in host memory and is the process runtime
//!   when `rocm` is off.

use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

#[cfg(feature = "rocm")]
pub mod hip_backend;
pub mod host;
pub mod stream;

#[cfg(feature = "rocm")]
pub use hip_backend::HipRuntime;
pub use host::HostRuntime;
pub use stream::{HipStream, Stream};

/// Raw status code returned by a runtime primitive
///
/// Codes follow the HIP numbering so both backends report the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeStatus(i32);

impl RuntimeStatus {
    pub const SUCCESS: RuntimeStatus = RuntimeStatus(0);
    pub const INVALID_VALUE: RuntimeStatus = RuntimeStatus(1);
    pub const OUT_OF_MEMORY: RuntimeStatus = RuntimeStatus(2);
    pub const INVALID_DEVICE_POINTER: RuntimeStatus = RuntimeStatus(17);
    pub const INVALID_HANDLE: RuntimeStatus = RuntimeStatus(400);

    pub fn from_code(code: i32) -> Self {
        RuntimeStatus(code)
    }

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// `Ok(())` for success, the status itself otherwise
    pub fn into_result(self) -> Result<(), RuntimeStatus> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}

/// Snapshot of raw primitive usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Successful raw allocations
    pub malloc_calls: usize,
    /// Successful raw frees
    pub free_calls: usize,
    /// Bytes handed out by successful raw allocations, cumulative
    pub bytes_allocated: usize,
}

impl RuntimeStats {
    /// Raw allocations not yet freed
    pub fn live_allocations(&self) -> usize {
        self.malloc_calls.saturating_sub(self.free_calls)
    }
}

/// Counters shared by the runtime implementations
#[derive(Debug, Default)]
pub(crate) struct RuntimeCounters {
    malloc_calls: AtomicUsize,
    free_calls: AtomicUsize,
    bytes_allocated: AtomicUsize,
}

impl RuntimeCounters {
    pub(crate) fn record_malloc(&self, bytes: usize) {
        self.malloc_calls.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_free(&self) {
        self.free_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            malloc_calls: self.malloc_calls.load(Ordering::Relaxed),
            free_calls: self.free_calls.load(Ordering::Relaxed),
            bytes_allocated: self.bytes_allocated.load(Ordering::Relaxed),
        }
    }
}

/// Raw primitives of an accelerator runtime
///
/// Methods taking device pointers are `unsafe`: the pointer must come from
/// [`DeviceRuntime::malloc`] on the same runtime, still be live, and cover
/// `bytes` bytes. Host pointers must cover `bytes` bytes as well. Async variants
/// additionally require the host memory to stay valid until `stream` is
/// synchronized.
pub trait DeviceRuntime: Send + Sync + fmt::Debug {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Reserve `bytes` of device memory. A zero-byte request returns null.
    fn malloc(&self, bytes: usize) -> Result<*mut c_void, RuntimeStatus>;

    /// Release memory from `malloc`. Null is accepted and ignored.
    unsafe fn free(&self, ptr: *mut c_void) -> Result<(), RuntimeStatus>;

    /// Blocking host-to-device copy
    unsafe fn memcpy_htod(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
    ) -> Result<(), RuntimeStatus>;

    /// Blocking device-to-host copy
    unsafe fn memcpy_dtoh(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
    ) -> Result<(), RuntimeStatus>;

    /// Host-to-device copy enqueued on `stream`
    unsafe fn memcpy_htod_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
        stream: Stream,
    ) -> Result<(), RuntimeStatus>;

    /// Device-to-host copy enqueued on `stream`
    unsafe fn memcpy_dtoh_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
        stream: Stream,
    ) -> Result<(), RuntimeStatus>;

    /// Blocking byte fill
    unsafe fn memset(&self, dst: *mut c_void, value: u8, bytes: usize) -> Result<(), RuntimeStatus>;

    /// Byte fill enqueued on `stream`
    unsafe fn memset_async(
        &self,
        dst: *mut c_void,
        value: u8,
        bytes: usize,
        stream: Stream,
    ) -> Result<(), RuntimeStatus>;

    fn stream_create(&self) -> Result<Stream, RuntimeStatus>;

    /// Destroy a stream from `stream_create`. The token must not be used afterwards.
    unsafe fn stream_destroy(&self, stream: Stream) -> Result<(), RuntimeStatus>;

    /// Block until all work enqueued on `stream` has completed
    fn stream_synchronize(&self, stream: Stream) -> Result<(), RuntimeStatus>;

    /// Runtime's description of a status code
    fn error_string(&self, status: RuntimeStatus) -> String;

    fn stats(&self) -> RuntimeStats;
}

#[cfg(feature = "rocm")]
static RUNTIME: Lazy<HipRuntime> = Lazy::new(|| {
    tracing::debug!("runtime: using ROCm HIP runtime");
    HipRuntime::new()
});

#[cfg(not(feature = "rocm"))]
static RUNTIME: Lazy<HostRuntime> = Lazy::new(|| {
    let capacity = crate::config::config().host_capacity_bytes;
    tracing::debug!(
        "runtime: using host-emulated device with {} MB capacity",
        capacity / (1024 * 1024)
    );
    HostRuntime::with_capacity(capacity)
});

/// The process-wide device runtime
pub fn runtime() -> &'static dyn DeviceRuntime {
    &*RUNTIME
}

/// The process-wide host-emulated runtime, when it is the active backend
#[cfg(not(feature = "rocm"))]
pub fn host_runtime() -> &'static HostRuntime {
    &RUNTIME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_into_result() {
        assert_eq!(RuntimeStatus::SUCCESS.into_result(), Ok(()));
        assert_eq!(
            RuntimeStatus::OUT_OF_MEMORY.into_result(),
            Err(RuntimeStatus::OUT_OF_MEMORY)
        );
        assert_eq!(RuntimeStatus::from_code(17), RuntimeStatus::INVALID_DEVICE_POINTER);
    }

    #[test]
    fn test_live_allocations_from_counters() {
        let counters = RuntimeCounters::default();
        counters.record_malloc(64);
        counters.record_malloc(32);
        counters.record_free();

        let stats = counters.snapshot();
        assert_eq!(stats.malloc_calls, 2);
        assert_eq!(stats.free_calls, 1);
        assert_eq!(stats.bytes_allocated, 96);
        assert_eq!(stats.live_allocations(), 1);
    }
}
