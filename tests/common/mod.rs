//! Common test utilities
//!
//! - [`RUNTIME_FIXTURE`]: initializes logging and the process runtime once
//! - [`LeakCheck`]: asserts that a test released every raw allocation it made
//! - [`CountingAllocator`]: tracked-allocation strategy that counts its calls
//!
//! Every test touching the runtime or the allocator slot runs `#[serial]`: the
//! counters and the slot are process-wide.

#![allow(dead_code)]

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use hipmem::backend::{runtime, DeviceRuntime, RuntimeStats};
use hipmem::memory::{DeviceAllocator, RuntimeAllocator};
use hipmem::HipResult;
use once_cell::sync::Lazy;
pub use serial_test::serial;

/// Shared fixture, initialized once per test binary
pub static RUNTIME_FIXTURE: Lazy<RuntimeFixture> = Lazy::new(|| {
    hipmem::init_logging_default();
    let fixture = RuntimeFixture {
        rt: runtime(),
    };
    eprintln!("runtime fixture: backend '{}'", fixture.rt.name());
    fixture
});

pub struct RuntimeFixture {
    rt: &'static dyn DeviceRuntime,
}

impl RuntimeFixture {
    pub fn runtime(&self) -> &'static dyn DeviceRuntime {
        self.rt
    }

    pub fn stats(&self) -> RuntimeStats {
        self.rt.stats()
    }

    /// Start a leak check against the current raw allocation count
    pub fn leak_check(&self) -> LeakCheck {
        LeakCheck {
            rt: self.rt,
            live_at_start: self.rt.stats().live_allocations(),
        }
    }
}

/// Snapshot of live raw allocations at the start of a test
pub struct LeakCheck {
    rt: &'static dyn DeviceRuntime,
    live_at_start: usize,
}

impl LeakCheck {
    /// Panics if raw allocations are still live that were not live at the start
    pub fn assert_no_leak(&self) {
        let live = self.rt.stats().live_allocations();
        assert!(
            live <= self.live_at_start,
            "device memory leak: {} live allocations at start, {} now",
            self.live_at_start,
            live
        );
    }
}

/// Strategy that forwards to the runtime and records every call
#[derive(Debug, Default)]
pub struct CountingAllocator {
    pub allocations: AtomicUsize,
    pub frees: AtomicUsize,
    /// `outstanding` values seen by `allocate`, in call order
    pub seen_outstanding: Mutex<Vec<usize>>,
}

impl CountingAllocator {
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    pub fn seen_outstanding(&self) -> Vec<usize> {
        self.seen_outstanding.lock().unwrap().clone()
    }
}

impl DeviceAllocator for CountingAllocator {
    fn name(&self) -> &str {
        "counting"
    }

    fn allocate(&self, bytes: usize, outstanding: usize) -> HipResult<*mut c_void> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        self.seen_outstanding.lock().unwrap().push(outstanding);
        RuntimeAllocator.allocate(bytes, outstanding)
    }

    unsafe fn free(&self, ptr: *mut c_void, bytes: usize, outstanding: usize) -> HipResult<()> {
        self.frees.fetch_add(1, Ordering::SeqCst);
        RuntimeAllocator.free(ptr, bytes, outstanding)
    }
}

/// Deterministic test pattern: `len` values derived from `seed`
pub fn pattern_i32(len: usize, seed: i32) -> Vec<i32> {
    (0..len as i32)
        .map(|i| i.wrapping_mul(31).wrapping_add(seed))
        .collect()
}
