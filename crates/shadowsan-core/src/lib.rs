//! # shadowsan-core
//!
//! Shadow-memory encoding engine shared by every shadowsan layer.
//!
//! One shadow byte describes one granule of `G` application bytes:
//!
//! ```text
//! 0          all G bytes addressable
//! 1..=G-1    first k bytes addressable, the rest are not
//! magic      whole granule unaddressable; the value says why
//! 0xff       whole granule unaddressable (G = 128 only)
//! ```
//!
//! The crate is pure: it never allocates shadow, never maps memory and never
//! locks. Callers own the shadow buffer and decide when to poison.

#![deny(unsafe_code)]

pub mod check;
pub mod config;
pub mod counter;
pub mod error;
pub mod granule;
pub mod magic;
pub mod poison;

pub use check::{CheckFailure, check_failed};
pub use config::{RuntimeFlags, runtime_flags};
pub use counter::{Counter, ThreadSafety};
pub use error::FlagError;
pub use granule::{
    DEFAULT_GRANULARITY, GranuleState, Granularity, WIDE_GRANULARITY, WIDE_SENTINEL,
    decode_granule, encode_granule,
};
pub use magic::{ShadowMagic, validate_taxonomy};
pub use poison::{poison_partial_right_redzone, poison_shadow, shadow_len};
