//! [`DeviceRuntime`] over the HIP runtime API

use std::ffi::{c_void, CStr};
use std::ptr;

use super::ffi;
use crate::backend::{DeviceRuntime, RuntimeCounters, RuntimeStats, RuntimeStatus, Stream};

fn status(code: i32) -> Result<(), RuntimeStatus> {
    RuntimeStatus::from_code(code).into_result()
}

/// HIP runtime on the current device
#[derive(Debug, Default)]
pub struct HipRuntime {
    counters: RuntimeCounters,
}

impl HipRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRuntime for HipRuntime {
    fn name(&self) -> &'static str {
        "hip"
    }

    fn malloc(&self, bytes: usize) -> Result<*mut c_void, RuntimeStatus> {
        if bytes == 0 {
            return Ok(ptr::null_mut());
        }

        let mut ptr: *mut c_void = ptr::null_mut();
        tracing::trace!("hipMalloc: {} bytes", bytes);
        let result = unsafe { ffi::hipMalloc(&mut ptr, bytes) };
        tracing::trace!("hipMalloc returned result={}, ptr={:?}", result, ptr);
        status(result)?;

        if ptr.is_null() {
            return Err(RuntimeStatus::OUT_OF_MEMORY);
        }
        self.counters.record_malloc(bytes);
        Ok(ptr)
    }

    unsafe fn free(&self, ptr: *mut c_void) -> Result<(), RuntimeStatus> {
        if ptr.is_null() {
            return Ok(());
        }
        status(ffi::hipFree(ptr))?;
        self.counters.record_free();
        Ok(())
    }

    unsafe fn memcpy_htod(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
    ) -> Result<(), RuntimeStatus> {
        status(ffi::hipMemcpy(dst, src, bytes, ffi::HIP_MEMCPY_HOST_TO_DEVICE))
    }

    unsafe fn memcpy_dtoh(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
    ) -> Result<(), RuntimeStatus> {
        status(ffi::hipMemcpy(dst, src, bytes, ffi::HIP_MEMCPY_DEVICE_TO_HOST))
    }

    unsafe fn memcpy_htod_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
        stream: Stream,
    ) -> Result<(), RuntimeStatus> {
        status(ffi::hipMemcpyAsync(
            dst,
            src,
            bytes,
            ffi::HIP_MEMCPY_HOST_TO_DEVICE,
            stream.as_ptr(),
        ))
    }

    unsafe fn memcpy_dtoh_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
        stream: Stream,
    ) -> Result<(), RuntimeStatus> {
        status(ffi::hipMemcpyAsync(
            dst,
            src,
            bytes,
            ffi::HIP_MEMCPY_DEVICE_TO_HOST,
            stream.as_ptr(),
        ))
    }

    unsafe fn memset(&self, dst: *mut c_void, value: u8, bytes: usize) -> Result<(), RuntimeStatus> {
        status(ffi::hipMemset(dst, i32::from(value), bytes))
    }

    unsafe fn memset_async(
        &self,
        dst: *mut c_void,
        value: u8,
        bytes: usize,
        stream: Stream,
    ) -> Result<(), RuntimeStatus> {
        status(ffi::hipMemsetAsync(dst, i32::from(value), bytes, stream.as_ptr()))
    }

    fn stream_create(&self) -> Result<Stream, RuntimeStatus> {
        let mut raw: *mut c_void = ptr::null_mut();
        status(unsafe { ffi::hipStreamCreate(&mut raw) })?;
        if raw.is_null() {
            return Err(RuntimeStatus::INVALID_HANDLE);
        }
        // SAFETY: hipStreamCreate succeeded and returned a live stream.
        Ok(unsafe { Stream::from_raw(raw) })
    }

    unsafe fn stream_destroy(&self, stream: Stream) -> Result<(), RuntimeStatus> {
        status(ffi::hipStreamDestroy(stream.as_ptr()))
    }

    fn stream_synchronize(&self, stream: Stream) -> Result<(), RuntimeStatus> {
        status(unsafe { ffi::hipStreamSynchronize(stream.as_ptr()) })
    }

    fn error_string(&self, status: RuntimeStatus) -> String {
        let msg = unsafe { ffi::hipGetErrorString(status.code()) };
        if msg.is_null() {
            return format!("unknown HIP error {}", status.code());
        }
        // SAFETY: hipGetErrorString returns a static NUL-terminated string.
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    }

    fn stats(&self) -> RuntimeStats {
        self.counters.snapshot()
    }
}
