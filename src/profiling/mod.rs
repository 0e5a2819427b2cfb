//! Profiling range hooks
//!
//! [`range_start`] / [`range_stop`] bracket a region for external tracing tools.
//! With the `roctx` feature they push and pop ROCm tracer ranges (visible in
//! rocprof timelines); without it they only emit `trace` events. The choice is made
//! here, at build time, and nowhere else.
//!
//! Ranges nest per thread. [`ScopedRange`] pops its range on drop and logs the
//! elapsed wall time at `debug`.
//!
//! # Example
//!
//! ```rust
//! use hipmem::profiling::ScopedRange;
//!
//! {
//!     let _range = ScopedRange::new("upload_weights");
//!     // ... enqueue copies ...
//! } // range closed here
//! ```

use std::cell::Cell;
use std::time::Instant;

thread_local! {
    static RANGE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

#[cfg(feature = "roctx")]
mod roctx {
    use std::ffi::{c_char, CString};

    #[link(name = "roctx64")]
    extern "C" {
        fn roctxRangePushA(message: *const c_char) -> i32;
        fn roctxRangePop() -> i32;
    }

    pub(super) fn push(name: &str) {
        let message = CString::new(name).unwrap_or_default();
        unsafe {
            roctxRangePushA(message.as_ptr());
        }
    }

    pub(super) fn pop() {
        unsafe {
            roctxRangePop();
        }
    }
}

#[cfg(not(feature = "roctx"))]
mod roctx {
    pub(super) fn push(_name: &str) {}

    pub(super) fn pop() {}
}

/// Open a named range on the current thread
pub fn range_start(name: &str) {
    let depth = RANGE_DEPTH.with(|d| {
        d.set(d.get() + 1);
        d.get()
    });
    tracing::trace!(range = name, depth, "range start");
    roctx::push(name);
}

/// Close the innermost range on the current thread
///
/// Ignored, with a warning, when no range is open.
pub fn range_stop() {
    let closed = RANGE_DEPTH.with(|d| match d.get() {
        0 => false,
        n => {
            d.set(n - 1);
            true
        }
    });
    if !closed {
        tracing::warn!("range_stop called with no open range");
        return;
    }
    tracing::trace!("range stop");
    roctx::pop();
}

/// Number of ranges open on the current thread
pub fn range_depth() -> usize {
    RANGE_DEPTH.with(|d| d.get())
}

/// Range that closes when dropped
#[derive(Debug)]
pub struct ScopedRange {
    name: String,
    start: Instant,
}

impl ScopedRange {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        range_start(&name);
        ScopedRange {
            name,
            start: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Elapsed wall time in milliseconds
    pub fn elapsed(&self) -> f32 {
        self.start.elapsed().as_secs_f32() * 1000.0
    }
}

impl Drop for ScopedRange {
    fn drop(&mut self) {
        range_stop();
        tracing::debug!("range '{}': {:.3} ms", self.name, self.elapsed());
    }
}
