//! Host-emulated device runtime
//!
//! Device memory is carved from the host heap, so every primitive can be exercised
//! on machines without an AMD GPU. The emulation keeps the parts of the HIP
//! contract that matter to callers:
//!
//! - allocations are 256-byte aligned and bounded by a fixed capacity, with an
//!   out-of-memory status once it is exhausted
//! - freeing or copying through a pointer that is not inside a live allocation
//!   reports an invalid-device-pointer status instead of touching memory
//! - streams must be created before use; async work runs eagerly, which is a valid
//!   schedule for in-order streams
//!
//! Fresh allocations are zeroed. Real device memory is not, so callers must not
//! rely on it.

use std::alloc::{self, Layout};
use std::collections::{BTreeMap, HashSet};
use std::ffi::c_void;
use std::ptr;
use std::sync::Mutex;

use super::{DeviceRuntime, RuntimeCounters, RuntimeStats, RuntimeStatus, Stream};

/// Alignment of every emulated allocation, matching hipMalloc's guarantee
pub const HOST_ALLOC_ALIGN: usize = 256;

#[derive(Debug, Default)]
struct HostState {
    /// Live allocations keyed by base address
    blocks: BTreeMap<usize, Layout>,
    live_bytes: usize,
    streams: HashSet<usize>,
    next_stream: usize,
}

impl HostState {
    /// Check that `[addr, addr + bytes)` lies inside one live allocation
    fn validate_range(&self, addr: usize, bytes: usize) -> Result<(), RuntimeStatus> {
        let end = addr
            .checked_add(bytes)
            .ok_or(RuntimeStatus::INVALID_VALUE)?;
        match self.blocks.range(..=addr).next_back() {
            Some((&base, layout)) if end <= base + layout.size() => Ok(()),
            _ => Err(RuntimeStatus::INVALID_DEVICE_POINTER),
        }
    }

    fn validate_stream(&self, stream: Stream) -> Result<(), RuntimeStatus> {
        if stream.is_default() || self.streams.contains(&(stream.as_ptr() as usize)) {
            Ok(())
        } else {
            Err(RuntimeStatus::INVALID_HANDLE)
        }
    }
}

/// Device runtime backed by host memory
#[derive(Debug)]
pub struct HostRuntime {
    capacity: usize,
    state: Mutex<HostState>,
    counters: RuntimeCounters,
}

impl HostRuntime {
    /// Emulated device with `capacity` bytes of memory
    pub fn with_capacity(capacity: usize) -> Self {
        HostRuntime {
            capacity,
            state: Mutex::new(HostState {
                next_stream: 1,
                ..HostState::default()
            }),
            counters: RuntimeCounters::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently allocated
    pub fn live_bytes(&self) -> usize {
        self.lock().map(|state| state.live_bytes).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HostState>, RuntimeStatus> {
        // A poisoned lock means a panic mid-operation; report it like a device fault.
        self.state.lock().map_err(|_| RuntimeStatus::INVALID_VALUE)
    }

    unsafe fn copy(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
        device: *const c_void,
    ) -> Result<(), RuntimeStatus> {
        if bytes == 0 {
            return Ok(());
        }
        if dst.is_null() || src.is_null() {
            return Err(RuntimeStatus::INVALID_VALUE);
        }
        let state = self.lock()?;
        state.validate_range(device as usize, bytes)?;
        ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, bytes);
        Ok(())
    }

    unsafe fn fill(&self, dst: *mut c_void, value: u8, bytes: usize) -> Result<(), RuntimeStatus> {
        if bytes == 0 {
            return Ok(());
        }
        let state = self.lock()?;
        state.validate_range(dst as usize, bytes)?;
        ptr::write_bytes(dst as *mut u8, value, bytes);
        Ok(())
    }
}

impl DeviceRuntime for HostRuntime {
    fn name(&self) -> &'static str {
        "host"
    }

    fn malloc(&self, bytes: usize) -> Result<*mut c_void, RuntimeStatus> {
        if bytes == 0 {
            return Ok(ptr::null_mut());
        }

        let mut state = self.lock()?;
        let wanted = state
            .live_bytes
            .checked_add(bytes)
            .ok_or(RuntimeStatus::OUT_OF_MEMORY)?;
        if wanted > self.capacity {
            tracing::trace!(
                "host malloc: {} bytes exceeds capacity ({} of {} in use)",
                bytes,
                state.live_bytes,
                self.capacity
            );
            return Err(RuntimeStatus::OUT_OF_MEMORY);
        }

        let layout = Layout::from_size_align(bytes, HOST_ALLOC_ALIGN)
            .map_err(|_| RuntimeStatus::OUT_OF_MEMORY)?;
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(RuntimeStatus::OUT_OF_MEMORY);
        }

        state.blocks.insert(ptr as usize, layout);
        state.live_bytes = wanted;
        self.counters.record_malloc(bytes);
        tracing::trace!("host malloc: {} bytes at {:?}", bytes, ptr);
        Ok(ptr as *mut c_void)
    }

    unsafe fn free(&self, ptr: *mut c_void) -> Result<(), RuntimeStatus> {
        if ptr.is_null() {
            return Ok(());
        }

        let mut state = self.lock()?;
        let layout = state
            .blocks
            .remove(&(ptr as usize))
            .ok_or(RuntimeStatus::INVALID_DEVICE_POINTER)?;
        state.live_bytes -= layout.size();
        alloc::dealloc(ptr as *mut u8, layout);
        self.counters.record_free();
        tracing::trace!("host free: {} bytes at {:?}", layout.size(), ptr);
        Ok(())
    }

    unsafe fn memcpy_htod(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
    ) -> Result<(), RuntimeStatus> {
        self.copy(dst, src, bytes, dst)
    }

    unsafe fn memcpy_dtoh(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
    ) -> Result<(), RuntimeStatus> {
        self.copy(dst, src, bytes, src)
    }

    unsafe fn memcpy_htod_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
        stream: Stream,
    ) -> Result<(), RuntimeStatus> {
        self.lock()?.validate_stream(stream)?;
        self.copy(dst, src, bytes, dst)
    }

    unsafe fn memcpy_dtoh_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
        stream: Stream,
    ) -> Result<(), RuntimeStatus> {
        self.lock()?.validate_stream(stream)?;
        self.copy(dst, src, bytes, src)
    }

    unsafe fn memset(&self, dst: *mut c_void, value: u8, bytes: usize) -> Result<(), RuntimeStatus> {
        self.fill(dst, value, bytes)
    }

    unsafe fn memset_async(
        &self,
        dst: *mut c_void,
        value: u8,
        bytes: usize,
        stream: Stream,
    ) -> Result<(), RuntimeStatus> {
        self.lock()?.validate_stream(stream)?;
        self.fill(dst, value, bytes)
    }

    fn stream_create(&self) -> Result<Stream, RuntimeStatus> {
        let mut state = self.lock()?;
        let id = state.next_stream;
        state.next_stream += 1;
        state.streams.insert(id);
        // SAFETY: the token is registered above and only ever compared, never dereferenced.
        Ok(unsafe { Stream::from_raw(id as *mut c_void) })
    }

    unsafe fn stream_destroy(&self, stream: Stream) -> Result<(), RuntimeStatus> {
        let mut state = self.lock()?;
        if state.streams.remove(&(stream.as_ptr() as usize)) {
            Ok(())
        } else {
            Err(RuntimeStatus::INVALID_HANDLE)
        }
    }

    fn stream_synchronize(&self, stream: Stream) -> Result<(), RuntimeStatus> {
        // Work is executed at enqueue time, so there is nothing to wait for.
        self.lock()?.validate_stream(stream)
    }

    fn error_string(&self, status: RuntimeStatus) -> String {
        match status {
            RuntimeStatus::SUCCESS => "no error",
            RuntimeStatus::INVALID_VALUE => "invalid argument",
            RuntimeStatus::OUT_OF_MEMORY => "out of memory",
            RuntimeStatus::INVALID_DEVICE_POINTER => "invalid device pointer",
            RuntimeStatus::INVALID_HANDLE => "invalid resource handle",
            _ => "unknown error",
        }
        .to_string()
    }

    fn stats(&self) -> RuntimeStats {
        self.counters.snapshot()
    }
}

impl Drop for HostRuntime {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (&addr, &layout) in &state.blocks {
            // SAFETY: every entry was produced by `alloc_zeroed` with this layout.
            unsafe { alloc::dealloc(addr as *mut u8, layout) };
        }
        if !state.blocks.is_empty() {
            tracing::debug!(
                "HostRuntime dropped with {} live allocations ({} bytes)",
                state.blocks.len(),
                state.live_bytes
            );
        }
    }
}
