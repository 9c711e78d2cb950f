//! `__asan_*` entry points called by instrumented code.
//!
//! Each export forwards to [`SanitizerRuntime`] on the process-wide runtime.
//! While the runtime is still being built (a reentrant call) non-fatal entry
//! points degrade to no-ops and fatal ones abort directly.

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_int};

use shadowsan_runtime::SanitizerRuntime;

use crate::runtime_state::runtime;

/// Borrow a C string, tolerating null.
///
/// # Safety
///
/// `ptr` must be null or point at a NUL-terminated string that outlives the
/// returned value.
unsafe fn c_str<'a>(ptr: *const c_char, fallback: &'static str) -> Cow<'a, str> {
    if ptr.is_null() {
        return Cow::Borrowed(fallback);
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
}

abi_fn! {
    /// Initialize the runtime. Safe to call more than once.
    fn __asan_init() {
        if let Some(rt) = runtime() {
            rt.init();
        }
    }
}

abi_fn! {
    /// Register an instrumented global of `size` bytes at `addr`.
    fn __asan_register_global(addr: usize, size: usize, name: *const c_char) {
        if let Some(rt) = runtime() {
            let name = c_str(name, "<unknown>");
            rt.register_global(addr, size, &name);
        }
    }
}

abi_fn! {
    /// Report an invalid access of `1 << log_access_size` bytes and abort.
    fn __asan_report_error(addr: usize, is_write: bool, log_access_size: c_int) -> ! {
        let log = u32::try_from(log_access_size).unwrap_or(0);
        match runtime() {
            Some(rt) => rt.report_error(addr, is_write, log),
            None => shadowsan_core::check_failed(
                "error reported before the runtime was ready",
                file!(),
                line!(),
            ),
        }
    }
}

abi_fn! {
    /// Frame storage for an instrumented function; `real_stack` when none.
    fn __asan_stack_malloc(size: usize, real_stack: usize) -> usize {
        match runtime() {
            Some(rt) => rt.stack_malloc(size, real_stack),
            None => real_stack,
        }
    }
}

abi_fn! {
    /// Release a frame returned by `__asan_stack_malloc`.
    fn __asan_stack_free(ptr: usize, size: usize, real_stack: usize) {
        if let Some(rt) = runtime() {
            rt.stack_free(ptr, size, real_stack);
        }
    }
}

abi_fn! {
    /// Internal invariant failure raised by instrumented code or the runtime.
    fn __asan_check_failed(cond: *const c_char, file: *const c_char, line: c_int) -> ! {
        let cond = c_str(cond, "<unknown>");
        let file = c_str(file, "<unknown>");
        let line = u32::try_from(line).unwrap_or(0);
        match runtime() {
            Some(rt) => rt.check_failed(&cond, &file, line),
            None => shadowsan_core::check_failed(&cond, &file, line),
        }
    }
}

abi_fn! {
    /// Print runtime statistics and abort.
    fn __asan_show_stats_and_abort() -> ! {
        match runtime() {
            Some(rt) => rt.show_stats_and_abort(),
            None => std::process::abort(),
        }
    }
}

abi_fn! {
    /// Shadow byte of the granule holding `addr` (`0` for untracked memory).
    fn __shadowsan_shadow_byte(addr: usize) -> u8 {
        runtime().map_or(0, |rt| rt.shadow().load(addr))
    }
}

abi_fn! {
    /// Whether any byte of `[addr, addr + size)` is unaddressable.
    fn __shadowsan_is_poisoned(addr: usize, size: usize) -> bool {
        runtime().is_some_and(|rt| rt.shadow().is_poisoned(addr, size))
    }
}
