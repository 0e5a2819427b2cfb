//! Status checking for runtime calls
//!
//! Every raw runtime primitive returns `Result<_, RuntimeStatus>`. [`hip_check!`]
//! records the call text and location and hands the result to [`check`], the one
//! place where a failing status becomes a [`HipError::Runtime`].

use crate::backend::{DeviceRuntime, RuntimeStatus};
use crate::error::{HipError, HipResult};

/// Where a checked runtime call was made
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallSite {
    pub call: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub module: &'static str,
}

/// Convert a raw runtime result into a `HipResult`, logging failures.
pub(crate) fn check<T>(
    rt: &dyn DeviceRuntime,
    result: Result<T, RuntimeStatus>,
    site: CallSite,
) -> HipResult<T> {
    result.map_err(|status| {
        let message = rt.error_string(status);
        tracing::error!(
            call = site.call,
            file = site.file,
            line = site.line,
            code = status.code(),
            runtime = rt.name(),
            "runtime call failed: {}",
            message
        );
        HipError::Runtime {
            call: site.call,
            file: site.file,
            line: site.line,
            module: site.module,
            code: status.code(),
            message,
        }
    })
}

/// Check a runtime call, capturing its source text and location.
///
/// `hip_check!(rt, rt.malloc(bytes))` evaluates the call once and yields
/// `HipResult<T>`.
macro_rules! hip_check {
    ($rt:expr, $call:expr) => {
        $crate::check::check(
            $rt,
            $call,
            $crate::check::CallSite {
                call: stringify!($call),
                file: file!(),
                line: line!(),
                module: module_path!(),
            },
        )
    };
}
