//! Error handling for hipmem
//!
//! Every runtime call made by this crate goes through [`crate::check`], which turns a
//! failing status into [`HipError::Runtime`]. The error carries the text of the call,
//! where it was made and the runtime's own message, so a failure can be diagnosed
//! from the log line alone.
//!
//! Runtime failures are returned, never retried and never turned into a process exit.
//! Callers unwind with `?` and release whatever device memory they already hold.

use thiserror::Error;

/// Errors raised by the allocation and transfer layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HipError {
    /// A runtime primitive returned a failing status
    #[error("{call} failed in {file}:{line} ({module}): {message} (code {code})")]
    Runtime {
        /// Source text of the failing call
        call: &'static str,
        file: &'static str,
        line: u32,
        module: &'static str,
        /// Raw status code reported by the runtime
        code: i32,
        /// Human-readable runtime error string
        message: String,
    },

    /// `len * size_of::<T>()` does not fit in `usize`
    #[error("byte size overflow: {len} elements of {elem_size} bytes")]
    ByteSizeOverflow { len: usize, elem_size: usize },

    /// Host slice shorter than the requested element count
    #[error("host buffer too small: need {needed} elements, have {actual}")]
    HostBufferTooSmall { needed: usize, actual: usize },

    /// Device handle holds fewer elements than requested
    #[error("device buffer too small: need {needed} elements, capacity {capacity}")]
    DeviceBufferTooSmall { needed: usize, capacity: usize },

    /// A custom allocator is already installed
    #[error("custom allocator '{0}' is already installed")]
    AllocatorAlreadyInstalled(String),

    /// A custom allocator reported success without an address
    #[error("allocator '{allocator}' returned null for {bytes} bytes")]
    AllocatorReturnedNull { allocator: String, bytes: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Internal lock poisoned - this indicates a bug: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for HipError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        HipError::LockPoisoned(format!("Lock poisoned: {}", err))
    }
}

/// Result type used across the crate
pub type HipResult<T> = Result<T, HipError>;

impl HipError {
    /// Runtime status code, if this error came from a runtime call
    pub fn code(&self) -> Option<i32> {
        match self {
            HipError::Runtime { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True if the error was reported by the device runtime rather than by argument checks
    pub fn is_runtime_failure(&self) -> bool {
        matches!(self, HipError::Runtime { .. })
    }
}
