//! Registry of instrumented globals.
//!
//! Each global is emitted by the compiler with a trailing redzone and
//! registered once at startup. Registration makes the object body addressable
//! and poisons the tail of its last granule plus one redzone unit after it
//! with [`ShadowMagic::GlobalRedzone`].

use std::collections::BTreeMap;

use parking_lot::RwLock;
use shadowsan_core::ShadowMagic;

use crate::error::RuntimeError;
use crate::shadow::ShadowMap;

/// Address, size and name of one instrumented global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDescriptor {
    pub addr: usize,
    pub size: usize,
    pub name: String,
}

impl GlobalDescriptor {
    #[must_use]
    pub fn new(addr: usize, size: usize, name: impl Into<String>) -> Self {
        Self {
            addr,
            size,
            name: name.into(),
        }
    }
}

/// Registered globals, ordered by address.
#[derive(Debug, Default)]
pub struct GlobalRegistry {
    entries: RwLock<BTreeMap<usize, GlobalDescriptor>>,
}

impl GlobalRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `desc` and poison its redzone in `shadow`, using `unit` as the
    /// redzone unit (the object's alignment).
    pub fn register(
        &self,
        desc: GlobalDescriptor,
        shadow: &ShadowMap,
        unit: usize,
    ) -> Result<(), RuntimeError> {
        if desc.addr % unit != 0 {
            return Err(RuntimeError::MisalignedGlobal {
                addr: desc.addr,
                name: desc.name,
                unit,
            });
        }
        let mut entries = self.entries.write();
        if entries.contains_key(&desc.addr) {
            return Err(RuntimeError::DuplicateGlobal {
                addr: desc.addr,
                name: desc.name,
            });
        }

        let aligned = desc.size - desc.size % unit;
        let tail = desc.size % unit;
        shadow.unpoison(desc.addr, aligned)?;
        let mut redzone_at = desc.addr + aligned;
        if tail != 0 {
            shadow.poison_redzone(redzone_at, tail, unit, ShadowMagic::GlobalRedzone)?;
            redzone_at += unit;
        }
        shadow.poison(redzone_at, unit, ShadowMagic::GlobalRedzone)?;

        entries.insert(desc.addr, desc);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every registered global in address order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<GlobalDescriptor> {
        self.entries.read().values().cloned().collect()
    }

    /// Nearest global to `addr` that `addr` could plausibly belong to.
    ///
    /// The candidate is the global starting at or below `addr`; if `addr` lies
    /// past its end the next global up is also considered and the closer one
    /// wins.
    #[must_use]
    pub fn describe_address(&self, addr: usize) -> Option<String> {
        let entries = self.entries.read();
        let below = entries.range(..=addr).next_back().map(|(_, d)| d);
        let above = entries
            .range(addr.saturating_add(1)..)
            .next()
            .map(|(_, d)| d);

        let desc = match (below, above) {
            (Some(b), _) if addr < b.addr + b.size => b,
            (Some(b), Some(a)) => {
                if addr - (b.addr + b.size) <= a.addr - addr {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        let relation = if addr < desc.addr {
            format!("{} bytes to the left of", desc.addr - addr)
        } else if addr >= desc.addr + desc.size {
            format!("{} bytes to the right of", addr - (desc.addr + desc.size))
        } else {
            format!("{} bytes inside of", addr - desc.addr)
        };
        Some(format!(
            "0x{addr:012x} is located {relation} global variable '{}' (0x{:x}) of size {}",
            desc.name, desc.addr, desc.size
        ))
    }
}
