//! Execution stream tokens

use std::ffi::c_void;
use std::ptr;

use crate::backend::{runtime, DeviceRuntime};
use crate::error::HipResult;

/// Opaque token naming an ordered queue of device operations
///
/// Operations issued on the same stream run in issue order. Nothing is implied
/// across streams, including between a named stream and [`Stream::DEFAULT`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stream(*mut c_void);

// SAFETY: the token is an opaque handle owned by the runtime; copying it between
// threads does not touch the queue it names.
unsafe impl Send for Stream {}
unsafe impl Sync for Stream {}

impl Stream {
    /// The runtime's implicit stream
    pub const DEFAULT: Stream = Stream(ptr::null_mut());

    /// Wrap a raw runtime stream handle
    ///
    /// # Safety
    /// `raw` must be null or a live stream of the process runtime.
    pub unsafe fn from_raw(raw: *mut c_void) -> Self {
        Stream(raw)
    }

    /// Raw handle (for FFI calls)
    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn is_default(self) -> bool {
        self.0.is_null()
    }
}

impl Default for Stream {
    fn default() -> Self {
        Stream::DEFAULT
    }
}

/// Owned runtime stream, destroyed on drop
///
/// Not `Clone`: two owners would destroy the same stream twice.
#[derive(Debug)]
pub struct HipStream {
    stream: Stream,
    rt: &'static dyn DeviceRuntime,
}

impl HipStream {
    /// Create a new stream on the process runtime
    pub fn new() -> HipResult<Self> {
        let rt = runtime();
        tracing::debug!("HipStream::new: creating stream on {}", rt.name());
        let stream = hip_check!(rt, rt.stream_create())?;
        tracing::debug!("HipStream::new: created {:?}", stream.as_ptr());
        Ok(HipStream { stream, rt })
    }

    /// Block until every operation enqueued on this stream has completed
    pub fn synchronize(&self) -> HipResult<()> {
        let rt = self.rt;
        hip_check!(rt, rt.stream_synchronize(self.stream))
    }

    /// Token to pass to async transfer calls
    pub fn token(&self) -> Stream {
        self.stream
    }
}

impl Drop for HipStream {
    fn drop(&mut self) {
        let rt = self.rt;
        // SAFETY: the stream was created by `rt` and this is its only owner.
        if let Err(err) = hip_check!(rt, unsafe { rt.stream_destroy(self.stream) }) {
            tracing::warn!("HipStream::drop: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_stream_is_null() {
        assert!(Stream::DEFAULT.is_default());
        assert!(Stream::default().as_ptr().is_null());
    }

    #[test]
    #[serial]
    fn test_owned_stream_has_non_default_token() {
        let stream = HipStream::new().unwrap();
        assert!(!stream.token().is_default());
        stream.synchronize().unwrap();
    }
}
