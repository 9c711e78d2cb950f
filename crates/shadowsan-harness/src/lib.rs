//! Inspection and verification harness for shadowsan.
//!
//! This crate provides:
//! - Shadow rendering: hex dumps and decoded granule states
//! - Fixtures: JSON scenario files with the shadow bytes each one must produce
//! - Verify: replay fixtures against the engine and compare
//! - Structured logging: JSONL records for every verification run

#![forbid(unsafe_code)]

pub mod error;
pub mod fixtures;
pub mod render;
pub mod structured_log;
pub mod verify;

pub use error::HarnessError;
pub use fixtures::{FixtureCase, FixtureOp, FixtureSet};
pub use verify::{VerificationResult, verify_case, verify_set};
