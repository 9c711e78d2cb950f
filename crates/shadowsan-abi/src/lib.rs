// All extern "C" exports take raw addresses from instrumented code; the
// runtime checks what it can, so per-function safety docs would repeat the
// same contract.
#![allow(clippy::missing_safety_doc)]
//! # shadowsan-abi
//!
//! C ABI surface linked into instrumented programs.
//!
//! This crate produces a `cdylib` (`libshadowsan.so`) exporting the
//! `__asan_*` runtime interface plus two shadow inspection hooks used by
//! tests and debuggers.
//!
//! ```text
//! instrumented code -> __asan_* (this crate) -> Runtime (shadowsan-runtime)
//!                                                  -> shadow codec (shadowsan-core)
//! ```
//!
//! `__asan_printf` is not exported: a C-variadic definition needs the unstable
//! `c_variadic` feature. Diagnostics are written to stderr by the runtime.

#[macro_use]
mod macros;

mod runtime_state;

pub mod asan_abi;
pub mod mmap_abi;
