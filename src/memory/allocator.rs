//! Pluggable allocator strategy for tracked allocations
//!
//! Tracked allocations go through the process-wide allocator slot. While the slot
//! is empty they use the runtime's own allocate/free ([`RuntimeAllocator`]). A host
//! application that pools device memory installs its allocator once, before any
//! tracked traffic starts, and every tracked allocation and release in the process
//! routes through it until [`clear_allocator`] is called.
//!
//! The slot is not a synchronization point: installing or clearing while other
//! threads make tracked calls is a caller bug. An installed allocator is shared
//! across threads, so it must be thread-safe itself.
//!
//! Nothing tears the slot down at exit. Whoever installs an allocator keeps it
//! able to free every buffer it handed out.

use std::ffi::c_void;
use std::sync::{Arc, RwLock};

use crate::backend::runtime;
use crate::error::{HipError, HipResult};

/// Allocation strategy for tracked device memory
///
/// `outstanding` is the caller's accumulator before the call, passed by value.
/// Unlike a C-style hook taking `(void**, size_t, size_t&)`, the allocator never
/// gets the accumulator itself: the memory layer adds and subtracts the bytes, and
/// only after the hook succeeds.
///
/// `allocate` must return a non-null address for a non-zero request; a null result
/// is reported as [`HipError::AllocatorReturnedNull`] and nothing is counted.
pub trait DeviceAllocator: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str {
        "custom"
    }

    /// Reserve `bytes` of device memory. `bytes` is never zero.
    fn allocate(&self, bytes: usize, outstanding: usize) -> HipResult<*mut c_void>;

    /// Release memory returned by [`DeviceAllocator::allocate`]
    ///
    /// # Safety
    /// `ptr` must come from `allocate` on this allocator with the same `bytes`, and
    /// must not be used afterwards.
    unsafe fn free(&self, ptr: *mut c_void, bytes: usize, outstanding: usize) -> HipResult<()>;
}

/// The runtime's default allocate/free
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeAllocator;

impl DeviceAllocator for RuntimeAllocator {
    fn name(&self) -> &str {
        "runtime"
    }

    fn allocate(&self, bytes: usize, _outstanding: usize) -> HipResult<*mut c_void> {
        let rt = runtime();
        hip_check!(rt, rt.malloc(bytes))
    }

    unsafe fn free(&self, ptr: *mut c_void, _bytes: usize, _outstanding: usize) -> HipResult<()> {
        let rt = runtime();
        hip_check!(rt, rt.free(ptr))
    }
}

/// Allocate hook: `(bytes, outstanding) -> address`
pub type AllocFn = fn(usize, usize) -> HipResult<*mut c_void>;

/// Free hook: `(address, bytes, outstanding)`
pub type FreeFn = unsafe fn(*mut c_void, usize, usize) -> HipResult<()>;

/// Allocator built from a pair of plain functions
#[derive(Debug, Clone, Copy)]
pub struct FnAllocator {
    alloc: AllocFn,
    free: FreeFn,
}

impl FnAllocator {
    pub fn new(alloc: AllocFn, free: FreeFn) -> Self {
        FnAllocator { alloc, free }
    }
}

impl DeviceAllocator for FnAllocator {
    fn name(&self) -> &str {
        "fn-pair"
    }

    fn allocate(&self, bytes: usize, outstanding: usize) -> HipResult<*mut c_void> {
        (self.alloc)(bytes, outstanding)
    }

    unsafe fn free(&self, ptr: *mut c_void, bytes: usize, outstanding: usize) -> HipResult<()> {
        (self.free)(ptr, bytes, outstanding)
    }
}

static CUSTOM_ALLOCATOR: RwLock<Option<Arc<dyn DeviceAllocator>>> = RwLock::new(None);

/// Install the process-wide allocator for tracked allocations
///
/// Fails with [`HipError::AllocatorAlreadyInstalled`] if one is already present;
/// clear it first to replace it.
pub fn install_allocator(allocator: Arc<dyn DeviceAllocator>) -> HipResult<()> {
    let mut slot = CUSTOM_ALLOCATOR.write()?;
    if let Some(current) = slot.as_ref() {
        return Err(HipError::AllocatorAlreadyInstalled(current.name().to_string()));
    }
    tracing::info!("installing custom device allocator '{}'", allocator.name());
    *slot = Some(allocator);
    Ok(())
}

/// Install an allocate/free function pair
pub fn install_allocator_fns(alloc: AllocFn, free: FreeFn) -> HipResult<()> {
    install_allocator(Arc::new(FnAllocator::new(alloc, free)))
}

/// Remove the installed allocator, returning it
///
/// Buffers it issued must still be released through it, by the caller.
pub fn clear_allocator() -> HipResult<Option<Arc<dyn DeviceAllocator>>> {
    let previous = CUSTOM_ALLOCATOR.write()?.take();
    if let Some(allocator) = previous.as_ref() {
        tracing::info!("cleared custom device allocator '{}'", allocator.name());
    }
    Ok(previous)
}

/// Name of the installed allocator, `None` when the runtime default is in use
pub fn installed_allocator_name() -> HipResult<Option<String>> {
    Ok(CUSTOM_ALLOCATOR
        .read()?
        .as_ref()
        .map(|allocator| allocator.name().to_string()))
}

/// The allocator serving tracked calls right now
pub(crate) fn active_allocator() -> HipResult<Option<Arc<dyn DeviceAllocator>>> {
    Ok(CUSTOM_ALLOCATOR.read()?.clone())
}
