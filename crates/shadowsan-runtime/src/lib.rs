//! # shadowsan-runtime
//!
//! Driver-side runtime built on the `shadowsan-core` encoding engine.
//!
//! ```text
//! instrumented code / allocator driver
//!        |
//!        v
//!   Runtime (SanitizerRuntime) --> ShadowMap --> core poisoner/codec
//!        |            |
//!        |            +--> GlobalRegistry, FakeStack, Quarantine
//!        v
//!   ErrorReport (classification via the magic taxonomy)
//! ```

pub mod error;
pub mod fake_stack;
pub mod globals;
pub mod heap;
pub mod quarantine;
pub mod report;
pub mod runtime;
pub mod shadow;
pub mod stats;

pub use error::RuntimeError;
pub use fake_stack::{FakeStack, FakeStackTable, FrameLayout, FrameVar};
pub use globals::{GlobalDescriptor, GlobalRegistry};
pub use heap::HeapChunk;
pub use quarantine::Quarantine;
pub use report::{AccessInfo, BugKind, ErrorReport, shadow_legend};
pub use runtime::{Runtime, SanitizerRuntime};
pub use shadow::{ShadowMap, ShadowRow};
pub use stats::{Stats, StatsSnapshot};
