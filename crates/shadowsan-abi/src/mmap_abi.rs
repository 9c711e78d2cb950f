//! `__asan_mmap`: the runtime's own mapping primitive.
//!
//! Instrumented programs may interpose `mmap`; the runtime maps its internal
//! memory through this export so it never recurses into an interposed symbol.

use std::ffi::{c_int, c_void};

abi_fn! {
    /// Straight `mmap(2)` passthrough.
    fn __asan_mmap(
        addr: *mut c_void,
        length: usize,
        prot: c_int,
        flags: c_int,
        fd: c_int,
        offset: libc::off_t,
    ) -> *mut c_void {
        // SAFETY: arguments are forwarded unchanged; the caller upholds the
        // mmap(2) contract.
        libc::mmap(addr, length, prot, flags, fd, offset)
    }
}
