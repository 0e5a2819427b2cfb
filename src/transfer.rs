//! Host/device copies and device fills
//!
//! Every family comes in two forms:
//!
//! - a blocking `_sync` form that returns once the operation has completed on the
//!   device, so the result can be used immediately
//! - a stream-ordered form that only enqueues the operation on a [`Stream`]; the
//!   result is visible after the caller synchronizes that stream
//!
//! Typed wrappers check `len` against the host slice and the device handle, then
//! forward to byte-level routines. A runtime failure aborts the call with
//! [`HipError::Runtime`](crate::HipError::Runtime); there is no partial outcome.
//!
//! Async copies are `unsafe` because the runtime may still read or write the host
//! slice after the call returns.

use std::ffi::c_void;

use bytemuck::Pod;

use crate::backend::{runtime, Stream};
use crate::error::{HipError, HipResult};
use crate::memory::{byte_size, DevicePtr};

fn checked_bytes<T>(len: usize, host_len: Option<usize>, device: &DevicePtr<T>) -> HipResult<usize> {
    if let Some(actual) = host_len {
        if len > actual {
            return Err(HipError::HostBufferTooSmall { needed: len, actual });
        }
    }
    if len > device.len() {
        return Err(HipError::DeviceBufferTooSmall {
            needed: len,
            capacity: device.len(),
        });
    }
    byte_size::<T>(len)
}

// ========== Byte-level routines ==========

/// Set `bytes` bytes at `dst` to `value`, enqueued on `stream`
///
/// # Safety
/// `dst` must cover `bytes` bytes of live device memory.
pub unsafe fn set_device_bytes(dst: *mut c_void, value: u8, bytes: usize, stream: Stream) -> HipResult<()> {
    if bytes == 0 {
        return Ok(());
    }
    let rt = runtime();
    hip_check!(rt, rt.memset_async(dst, value, bytes, stream))
}

/// Set `bytes` bytes at `dst` to `value`, blocking until done
///
/// # Safety
/// `dst` must cover `bytes` bytes of live device memory.
pub unsafe fn set_device_bytes_sync(dst: *mut c_void, value: u8, bytes: usize) -> HipResult<()> {
    if bytes == 0 {
        return Ok(());
    }
    let rt = runtime();
    hip_check!(rt, rt.memset(dst, value, bytes))
}

/// Copy `bytes` from host `src` to device `dst`, enqueued on `stream`
///
/// # Safety
/// `src` must cover `bytes` readable host bytes and stay valid until `stream` is
/// synchronized; `dst` must cover `bytes` bytes of live device memory.
pub unsafe fn copy_htod_bytes(
    src: *const c_void,
    dst: *mut c_void,
    bytes: usize,
    stream: Stream,
) -> HipResult<()> {
    if bytes == 0 {
        return Ok(());
    }
    let rt = runtime();
    hip_check!(rt, rt.memcpy_htod_async(dst, src, bytes, stream))
}

/// Copy `bytes` from host `src` to device `dst`, blocking until done
///
/// # Safety
/// `src` must cover `bytes` readable host bytes; `dst` must cover `bytes` bytes of
/// live device memory.
pub unsafe fn copy_htod_bytes_sync(src: *const c_void, dst: *mut c_void, bytes: usize) -> HipResult<()> {
    if bytes == 0 {
        return Ok(());
    }
    let rt = runtime();
    hip_check!(rt, rt.memcpy_htod(dst, src, bytes))
}

/// Copy `bytes` from device `src` to host `dst`, enqueued on `stream`
///
/// # Safety
/// `dst` must cover `bytes` writable host bytes and stay valid, and unread, until
/// `stream` is synchronized; `src` must cover `bytes` bytes of live device memory.
pub unsafe fn copy_dtoh_bytes(
    src: *const c_void,
    dst: *mut c_void,
    bytes: usize,
    stream: Stream,
) -> HipResult<()> {
    if bytes == 0 {
        return Ok(());
    }
    let rt = runtime();
    hip_check!(rt, rt.memcpy_dtoh_async(dst, src, bytes, stream))
}

/// Copy `bytes` from device `src` to host `dst`, blocking until done
///
/// # Safety
/// `dst` must cover `bytes` writable host bytes; `src` must cover `bytes` bytes of
/// live device memory.
pub unsafe fn copy_dtoh_bytes_sync(src: *const c_void, dst: *mut c_void, bytes: usize) -> HipResult<()> {
    if bytes == 0 {
        return Ok(());
    }
    let rt = runtime();
    hip_check!(rt, rt.memcpy_dtoh(dst, src, bytes))
}

// ========== Fills ==========

/// Set every byte of the first `len` elements to `value`, enqueued on `stream`
pub fn fill_bytes<T: Pod>(ptr: &mut DevicePtr<T>, value: u8, len: usize, stream: Stream) -> HipResult<()> {
    let bytes = checked_bytes(len, None, ptr)?;
    // SAFETY: `bytes` is within the handle's allocation.
    unsafe { set_device_bytes(ptr.as_raw(), value, bytes, stream) }
}

/// Set every byte of the first `len` elements to `value`, blocking until done
pub fn fill_bytes_sync<T: Pod>(ptr: &mut DevicePtr<T>, value: u8, len: usize) -> HipResult<()> {
    let bytes = checked_bytes(len, None, ptr)?;
    // SAFETY: `bytes` is within the handle's allocation.
    unsafe { set_device_bytes_sync(ptr.as_raw(), value, bytes) }
}

/// Zero the first `len` elements, enqueued on `stream`
pub fn zero_fill<T: Pod>(ptr: &mut DevicePtr<T>, len: usize, stream: Stream) -> HipResult<()> {
    fill_bytes(ptr, 0, len, stream)
}

/// Zero the first `len` elements, blocking until done
pub fn zero_fill_sync<T: Pod>(ptr: &mut DevicePtr<T>, len: usize) -> HipResult<()> {
    fill_bytes_sync(ptr, 0, len)
}

// ========== Host -> Device ==========

/// Copy `len` elements from `src` to `dst`, enqueued on `stream`
///
/// # Safety
/// `src` must not be dropped or mutated until `stream` is synchronized.
pub unsafe fn copy_host_to_device<T: Pod>(
    src: &[T],
    dst: &mut DevicePtr<T>,
    len: usize,
    stream: Stream,
) -> HipResult<()> {
    let bytes = checked_bytes(len, Some(src.len()), dst)?;
    copy_htod_bytes(src.as_ptr() as *const c_void, dst.as_raw(), bytes, stream)
}

/// Copy `len` elements from `src` to `dst`, blocking until done
pub fn copy_host_to_device_sync<T: Pod>(src: &[T], dst: &mut DevicePtr<T>, len: usize) -> HipResult<()> {
    let bytes = checked_bytes(len, Some(src.len()), dst)?;
    // SAFETY: both ranges were checked against their lengths above.
    unsafe { copy_htod_bytes_sync(src.as_ptr() as *const c_void, dst.as_raw(), bytes) }
}

// ========== Device -> Host ==========

/// Copy `len` elements from `src` to `dst`, enqueued on `stream`
///
/// # Safety
/// `dst` must not be dropped, read or written until `stream` is synchronized.
pub unsafe fn copy_device_to_host<T: Pod>(
    src: &DevicePtr<T>,
    dst: &mut [T],
    len: usize,
    stream: Stream,
) -> HipResult<()> {
    let bytes = checked_bytes(len, Some(dst.len()), src)?;
    copy_dtoh_bytes(src.as_raw(), dst.as_mut_ptr() as *mut c_void, bytes, stream)
}

/// Copy `len` elements from `src` to `dst`, blocking until done
pub fn copy_device_to_host_sync<T: Pod>(src: &DevicePtr<T>, dst: &mut [T], len: usize) -> HipResult<()> {
    let bytes = checked_bytes(len, Some(dst.len()), src)?;
    // SAFETY: both ranges were checked against their lengths above.
    unsafe { copy_dtoh_bytes_sync(src.as_raw(), dst.as_mut_ptr() as *mut c_void, bytes) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{allocate, deallocate};
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_host_slice_shorter_than_len_is_rejected() {
        let mut dev = allocate::<u32>(8).unwrap();
        let err = copy_host_to_device_sync(&[1u32, 2, 3], &mut dev, 4).unwrap_err();
        assert_eq!(err, HipError::HostBufferTooSmall { needed: 4, actual: 3 });
        deallocate(dev).unwrap();
    }

    #[test]
    #[serial]
    fn test_len_beyond_device_buffer_is_rejected() {
        let dev = allocate::<u16>(2).unwrap();
        let mut host = [0u16; 4];
        let err = copy_device_to_host_sync(&dev, &mut host, 4).unwrap_err();
        assert_eq!(err, HipError::DeviceBufferTooSmall { needed: 4, capacity: 2 });
        deallocate(dev).unwrap();
    }

    #[test]
    #[serial]
    fn test_partial_copy_leaves_tail_untouched() {
        let mut dev = allocate::<u8>(4).unwrap();
        zero_fill_sync(&mut dev, 4).unwrap();
        copy_host_to_device_sync(&[9u8, 9, 9, 9], &mut dev, 2).unwrap();

        let mut host = [0xFFu8; 4];
        copy_device_to_host_sync(&dev, &mut host, 4).unwrap();
        assert_eq!(host, [9, 9, 0, 0]);
        deallocate(dev).unwrap();
    }

    #[test]
    #[serial]
    fn test_fill_bytes_sets_every_byte_of_each_element() {
        let mut dev = allocate::<u32>(3).unwrap();
        fill_bytes_sync(&mut dev, 0x01, 3).unwrap();
        let mut host = [0u32; 3];
        copy_device_to_host_sync(&dev, &mut host, 3).unwrap();
        assert_eq!(host, [0x0101_0101; 3]);
        deallocate(dev).unwrap();
    }

    #[test]
    fn test_zero_len_on_null_handle_is_noop() {
        let mut dev = DevicePtr::<f32>::from_raw_parts(std::ptr::null_mut(), 0);
        zero_fill_sync(&mut dev, 0).unwrap();
        copy_host_to_device_sync(&[0f32; 0], &mut dev, 0).unwrap();
        copy_device_to_host_sync(&dev, &mut [0f32; 0], 0).unwrap();
    }
}
