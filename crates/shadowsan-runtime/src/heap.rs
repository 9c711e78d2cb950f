//! Heap chunk geometry and poisoning.

use shadowsan_core::{Granularity, ShadowMagic};

use crate::error::RuntimeError;
use crate::shadow::ShadowMap;

/// One heap allocation as laid out by an allocator driver:
///
/// ```text
/// beg        user_beg              user_beg + round_up(size, rz)
///  | left rz |  user bytes .. pad  | right rz |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapChunk {
    /// Start of the left redzone.
    pub beg: usize,
    pub user_size: usize,
    pub redzone: usize,
}

impl HeapChunk {
    #[must_use]
    pub const fn new(beg: usize, user_size: usize, redzone: usize) -> Self {
        Self {
            beg,
            user_size,
            redzone,
        }
    }

    /// Check the geometry before any size arithmetic: the redzone must be a
    /// non-zero multiple of the granule, `beg` granule-aligned, and the whole
    /// chunk must fit in the address space.
    pub fn validate(&self, granularity: Granularity) -> Result<(), RuntimeError> {
        let g = granularity.bytes();
        if self.redzone == 0 || self.redzone % g != 0 {
            return Err(RuntimeError::InvalidHeapRedzone {
                redzone: self.redzone,
                granularity: g,
            });
        }
        if granularity.offset_of(self.beg) != 0 {
            return Err(RuntimeError::Misaligned {
                addr: self.beg,
                granularity: g,
            });
        }
        let fits = self
            .user_size
            .div_ceil(self.redzone)
            .checked_mul(self.redzone)
            .and_then(|rounded| rounded.checked_add(2 * self.redzone))
            .and_then(|total| self.beg.checked_add(total))
            .is_some();
        if !fits {
            return Err(RuntimeError::ChunkTooLarge {
                addr: self.beg,
                size: self.user_size,
            });
        }
        Ok(())
    }

    /// Address handed to the application.
    #[must_use]
    pub const fn user_beg(&self) -> usize {
        self.beg + self.redzone
    }

    /// User bytes rounded up to the redzone size. Only meaningful once
    /// [`validate`](Self::validate) has passed.
    #[must_use]
    pub const fn rounded_size(&self) -> usize {
        self.user_size.div_ceil(self.redzone) * self.redzone
    }

    /// Whole chunk including both redzones.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.redzone + self.rounded_size() + self.redzone
    }

    #[must_use]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.beg && addr < self.beg + self.chunk_size()
    }

    /// Shadow for a live allocation: left redzone, addressable user bytes,
    /// right redzone covering the padding and one more redzone.
    pub fn poison_allocated(&self, shadow: &ShadowMap) -> Result<(), RuntimeError> {
        shadow.poison(self.beg, self.redzone, ShadowMagic::HeapLeftRedzone)?;
        shadow.poison_redzone(
            self.user_beg(),
            self.user_size,
            self.rounded_size() + self.redzone,
            ShadowMagic::HeapRightRedzone,
        )
    }

    /// Shadow for a freed allocation: the user region becomes
    /// [`ShadowMagic::HeapFreed`]; redzones are left as they were.
    pub fn poison_freed(&self, shadow: &ShadowMap) -> Result<(), RuntimeError> {
        shadow.poison(
            self.user_beg(),
            self.rounded_size(),
            ShadowMagic::HeapFreed,
        )
    }

    /// Location text for an address inside the chunk.
    #[must_use]
    pub fn describe(&self, addr: usize) -> Option<String> {
        if !self.contains(addr) {
            return None;
        }
        let user_beg = self.user_beg();
        let user_end = user_beg + self.user_size;
        let relation = if addr < user_beg {
            format!("{} bytes to the left of", user_beg - addr)
        } else if addr >= user_end {
            format!("{} bytes to the right of", addr - user_end)
        } else {
            format!("{} bytes inside of", addr - user_beg)
        };
        Some(format!(
            "0x{addr:012x} is located {relation} {}-byte region [0x{user_beg:012x},0x{user_end:012x})",
            self.user_size
        ))
    }
}
