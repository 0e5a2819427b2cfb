//! Device memory allocation and accounting
//!
//! Two pairs of entry points:
//!
//! - [`allocate`] / [`deallocate`]: always the runtime's own primitives, no
//!   bookkeeping. This is the hot path used by allocator-agnostic code.
//! - [`tracked_allocate`] / [`tracked_deallocate`]: routed through the installed
//!   [`DeviceAllocator`] when there is one, and accounted in a caller-owned byte
//!   counter. Pooling allocators use the counter to know their outstanding usage
//!   without asking the runtime.
//!
//! Lengths are in elements and converted to bytes at every call. Each typed
//! function forwards to a byte-level routine of the same name with a `_bytes`
//! suffix.
//!
//! # Preconditions
//!
//! Not checked at runtime:
//! - a tracked release passes the same `len` as the allocation that produced the
//!   handle, and the same counter
//! - a handle from [`allocate`] is released with [`deallocate`], one from
//!   [`tracked_allocate`] with [`tracked_deallocate`]
//! - the installed allocator does not change between a tracked allocation and its
//!   release
//!
//! # Zero length
//!
//! A zero-byte request (zero elements, or any number of a zero-sized type)
//! returns a null handle without calling the runtime or the installed
//! allocator. Releasing it is a no-op and the counter moves by zero.

pub mod allocator;
pub mod device_ptr;

use std::ffi::c_void;
use std::mem;
use std::ptr;

use crate::backend::runtime;
use crate::config::config;
use crate::error::{HipError, HipResult};

pub use allocator::{
    clear_allocator, install_allocator, install_allocator_fns, installed_allocator_name,
    AllocFn, DeviceAllocator, FnAllocator, FreeFn, RuntimeAllocator,
};
pub use device_ptr::DevicePtr;

/// `len * size_of::<T>()`, or an error if it overflows
pub fn byte_size<T>(len: usize) -> HipResult<usize> {
    let elem_size = mem::size_of::<T>();
    len.checked_mul(elem_size)
        .ok_or(HipError::ByteSizeOverflow { len, elem_size })
}

fn warn_if_large(bytes: usize) {
    let threshold = config().large_allocation_warn_bytes;
    if bytes > threshold {
        tracing::warn!(
            "Large device allocation requested: {} MB (warn threshold {} MB)",
            bytes / (1024 * 1024),
            threshold / (1024 * 1024)
        );
    }
}

/// Reserve `bytes` through the runtime's default primitive
pub fn allocate_bytes(bytes: usize) -> HipResult<*mut c_void> {
    if bytes == 0 {
        return Ok(ptr::null_mut());
    }
    warn_if_large(bytes);

    let rt = runtime();
    let ptr = hip_check!(rt, rt.malloc(bytes))?;
    tracing::trace!("allocate_bytes: {} bytes at {:?}", bytes, ptr);
    Ok(ptr)
}

/// Release memory from [`allocate_bytes`]
///
/// # Safety
/// `ptr` must be null or come from [`allocate_bytes`] and not have been released.
pub unsafe fn deallocate_bytes(ptr: *mut c_void) -> HipResult<()> {
    if ptr.is_null() {
        return Ok(());
    }
    let rt = runtime();
    hip_check!(rt, rt.free(ptr))?;
    tracing::trace!("deallocate_bytes: released {:?}", ptr);
    Ok(())
}

/// Reserve `bytes` through the active strategy and add them to `allocation`
///
/// On failure `allocation` is left as it was.
pub fn tracked_allocate_bytes(bytes: usize, allocation: &mut usize) -> HipResult<*mut c_void> {
    if bytes == 0 {
        return Ok(ptr::null_mut());
    }
    warn_if_large(bytes);

    let ptr = match allocator::active_allocator()? {
        Some(custom) => {
            tracing::debug!(
                "tracked_allocate: {} bytes via '{}' (outstanding {})",
                bytes,
                custom.name(),
                *allocation
            );
            let ptr = custom.allocate(bytes, *allocation)?;
            if ptr.is_null() {
                return Err(HipError::AllocatorReturnedNull {
                    allocator: custom.name().to_string(),
                    bytes,
                });
            }
            ptr
        }
        None => {
            tracing::trace!(
                "tracked_allocate: {} bytes via runtime (outstanding {})",
                bytes,
                *allocation
            );
            RuntimeAllocator.allocate(bytes, *allocation)?
        }
    };

    *allocation += bytes;
    Ok(ptr)
}

/// Release memory from [`tracked_allocate_bytes`] and subtract `bytes` from `allocation`
///
/// On failure `allocation` is left as it was.
///
/// # Safety
/// `ptr` must be null or come from [`tracked_allocate_bytes`] with the same `bytes`,
/// served by the strategy that is still active, and not have been released.
pub unsafe fn tracked_deallocate_bytes(
    ptr: *mut c_void,
    bytes: usize,
    allocation: &mut usize,
) -> HipResult<()> {
    if ptr.is_null() {
        // Null only comes from a zero-byte request, which was never counted.
        return Ok(());
    }

    match allocator::active_allocator()? {
        Some(custom) => {
            tracing::debug!(
                "tracked_deallocate: {} bytes via '{}' (outstanding {})",
                bytes,
                custom.name(),
                *allocation
            );
            custom.free(ptr, bytes, *allocation)?
        }
        None => RuntimeAllocator.free(ptr, bytes, *allocation)?,
    }

    debug_assert!(
        *allocation >= bytes,
        "tracked_deallocate: releasing {} bytes with only {} outstanding",
        bytes,
        *allocation
    );
    *allocation = allocation.saturating_sub(bytes);
    Ok(())
}

/// Allocate device memory for `len` elements of `T` with the runtime's primitive
///
/// Failure is returned as [`HipError::Runtime`]; out-of-memory is not retried.
pub fn allocate<T>(len: usize) -> HipResult<DevicePtr<T>> {
    let bytes = byte_size::<T>(len)?;
    if bytes == 0 {
        return Ok(DevicePtr::from_raw_parts(ptr::null_mut(), len));
    }
    let ptr = allocate_bytes(bytes)?;
    Ok(DevicePtr::from_raw_parts(ptr, len))
}

/// Release a buffer from [`allocate`]
///
/// The handle must come from [`allocate`] (or adopt memory from the runtime's own
/// primitive). A handle from [`tracked_allocate`] may belong to a custom pool and
/// must go back through [`tracked_deallocate`]; passing it here hands a pool
/// address to the runtime's free. This is not checked.
pub fn deallocate<T>(ptr: DevicePtr<T>) -> HipResult<()> {
    // SAFETY: the handle was produced by `allocate` and is consumed here.
    unsafe { deallocate_bytes(ptr.as_raw()) }
}

/// Allocate `len` elements of `T` through the active strategy, counting the bytes
/// in `allocation`
pub fn tracked_allocate<T>(len: usize, allocation: &mut usize) -> HipResult<DevicePtr<T>> {
    let bytes = byte_size::<T>(len)?;
    if bytes == 0 {
        return Ok(DevicePtr::from_raw_parts(ptr::null_mut(), len));
    }
    let ptr = tracked_allocate_bytes(bytes, allocation)?;
    Ok(DevicePtr::from_raw_parts(ptr, len))
}

/// Release a buffer from [`tracked_allocate`], subtracting `len * size_of::<T>()`
/// from `allocation`
///
/// `len` is taken as given; it must equal the length the handle was allocated
/// with.
pub fn tracked_deallocate<T>(ptr: DevicePtr<T>, len: usize, allocation: &mut usize) -> HipResult<()> {
    let bytes = byte_size::<T>(len)?;
    // SAFETY: the handle was produced by `tracked_allocate` and is consumed here.
    unsafe { tracked_deallocate_bytes(ptr.as_raw(), bytes, allocation) }
}
