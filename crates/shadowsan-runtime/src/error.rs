//! Recoverable driver-side errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("global `{name}` at {addr:#x} is already registered")]
    DuplicateGlobal { addr: usize, name: String },
    #[error("global `{name}` at {addr:#x} is not aligned to the {unit}-byte redzone unit")]
    MisalignedGlobal {
        addr: usize,
        name: String,
        unit: usize,
    },
    #[error("address {addr:#x} is not aligned to the {granularity}-byte granule")]
    Misaligned { addr: usize, granularity: usize },
    #[error("stack frame layout has no variables")]
    EmptyFrame,
    #[error("redzone unit {unit} must be a power of two no smaller than the granule")]
    InvalidRedzoneUnit { unit: usize },
    #[error("heap redzone {redzone} must be a non-zero multiple of the {granularity}-byte granule")]
    InvalidHeapRedzone { redzone: usize, granularity: usize },
    #[error("heap chunk at {addr:#x} with {size} user bytes does not fit in the address space")]
    ChunkTooLarge { addr: usize, size: usize },
    #[error("fake stack frame of {size} bytes cannot be laid out")]
    FrameTooLarge { size: usize },
    #[error("heap chunk at {addr:#x} overlaps a live allocation")]
    ChunkOverlap { addr: usize },
    #[error("free of {addr:#x}, which is not a live allocation")]
    NotAllocated { addr: usize },
}
