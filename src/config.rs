//! Configuration for the memory layer
//!
//! [`MemoryConfig`] holds the few knobs the allocation layer reads. The
//! process-wide value is resolved once from the environment on first use.
//!
//! # Environment Variables
//!
//! - `HIPMEM_LARGE_ALLOC_WARN_MB`: allocations above this size log a warning
//!   (default 1024)
//! - `HIPMEM_HOST_CAPACITY_MB`: memory of the host-emulated device (default 4096)

use once_cell::sync::Lazy;

use crate::error::{HipError, HipResult};

const MB: usize = 1024 * 1024;

const LARGE_ALLOC_WARN_ENV: &str = "HIPMEM_LARGE_ALLOC_WARN_MB";
const HOST_CAPACITY_ENV: &str = "HIPMEM_HOST_CAPACITY_MB";

/// Memory layer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Allocation size above which a warning is logged
    pub large_allocation_warn_bytes: usize,

    /// Capacity of the host-emulated device
    pub host_capacity_bytes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            large_allocation_warn_bytes: 1024 * MB,
            host_capacity_bytes: 4096 * MB,
        }
    }
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_large_allocation_warn_bytes(mut self, bytes: usize) -> Self {
        self.large_allocation_warn_bytes = bytes;
        self
    }

    pub fn with_host_capacity_bytes(mut self, bytes: usize) -> Self {
        self.host_capacity_bytes = bytes;
        self
    }

    /// Read overrides from the environment, keeping defaults for unset variables
    pub fn from_env() -> HipResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> HipResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(mb) = parse_mb(&lookup, LARGE_ALLOC_WARN_ENV)? {
            config.large_allocation_warn_bytes = mb;
        }
        if let Some(mb) = parse_mb(&lookup, HOST_CAPACITY_ENV)? {
            config.host_capacity_bytes = mb;
        }
        Ok(config)
    }
}

fn parse_mb<F>(lookup: &F, key: &str) -> HipResult<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = match lookup(key) {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let mb: usize = raw.trim().parse().map_err(|_| {
        HipError::InvalidConfiguration(format!("{}={:?} is not a whole number of MB", key, raw))
    })?;
    mb.checked_mul(MB)
        .map(Some)
        .ok_or_else(|| HipError::InvalidConfiguration(format!("{}={} MB overflows usize", key, mb)))
}

static CONFIG: Lazy<MemoryConfig> = Lazy::new(|| {
    MemoryConfig::from_env().unwrap_or_else(|err| {
        tracing::warn!("{}; using default memory configuration", err);
        MemoryConfig::default()
    })
});

/// Process-wide configuration, resolved from the environment on first call
pub fn config() -> &'static MemoryConfig {
    &CONFIG
}
