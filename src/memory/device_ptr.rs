//! Typed handle to device memory

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::mem;

/// Address of `len` elements of `T` in device memory
///
/// Produced by [`allocate`](crate::memory::allocate) or
/// [`tracked_allocate`](crate::memory::tracked_allocate) and consumed by the
/// matching deallocation. The handle is not `Clone` and deallocation takes it by
/// value, so in safe code a buffer is released exactly once and never used after.
///
/// Dropping a handle without deallocating it leaks the device memory.
///
/// A zero-byte allocation yields a null handle; every operation on it is a no-op.
#[must_use = "dropping a DevicePtr leaks device memory; pass it to deallocate"]
pub struct DevicePtr<T> {
    ptr: *mut c_void,
    len: usize,
    _marker: PhantomData<*mut T>,
}

// SAFETY: the handle owns its allocation exclusively; moving it to another thread
// moves that ownership. Device memory is reached only through runtime calls.
unsafe impl<T: Send> Send for DevicePtr<T> {}
unsafe impl<T: Sync> Sync for DevicePtr<T> {}

impl<T> DevicePtr<T> {
    pub(crate) fn from_raw_parts(ptr: *mut c_void, len: usize) -> Self {
        DevicePtr {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    /// Adopt a device address allocated elsewhere
    ///
    /// # Safety
    /// `ptr` must be null for a zero-byte buffer, or point to at least
    /// `len * size_of::<T>()` bytes of device memory obtained from the allocation
    /// path it will later be released through.
    pub unsafe fn from_raw(ptr: *mut T, len: usize) -> Self {
        Self::from_raw_parts(ptr as *mut c_void, len)
    }

    /// Give up ownership, returning the address and element count
    pub fn into_raw(self) -> (*mut T, usize) {
        (self.ptr as *mut T, self.len)
    }

    /// Number of elements the handle was allocated with
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Size of the allocation in bytes
    pub fn byte_size(&self) -> usize {
        // Cannot overflow: checked when the handle was allocated.
        self.len * mem::size_of::<T>()
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr as *const T
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr as *mut T
    }

    /// Untyped address for runtime calls
    pub(crate) fn as_raw(&self) -> *mut c_void {
        self.ptr
    }
}

impl<T> fmt::Debug for DevicePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevicePtr")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("elem", &std::any::type_name::<T>())
            .finish()
    }
}
