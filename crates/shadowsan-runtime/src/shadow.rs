//! Sparse two-level shadow map.
//!
//! Level 1: hash map from shadow page number to an L2 page.
//! Level 2: 4096 shadow bytes, allocated on the first poisoning write.
//!
//! Shadow that was never written reads as `0` (addressable), so untracked
//! memory costs nothing. Bytes are relaxed atomics: a poisoning call is a
//! sequence of plain byte stores, callers serialize writers of one region and
//! readers of a stable region never race.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;
use shadowsan_core::{
    GranuleState, Granularity, ShadowMagic, decode_granule, poison_partial_right_redzone,
    shadow_len,
};

use crate::error::RuntimeError;

/// Shadow bytes per L2 page.
const SHADOW_PAGE: usize = 4096;

/// Shadow bytes per dumped row.
pub const ROW_BYTES: usize = 16;

/// One row of a shadow dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowRow {
    /// Application address described by the first byte of the row.
    pub app_addr: usize,
    pub bytes: [u8; ROW_BYTES],
}

struct ShadowPage {
    bytes: Box<[AtomicU8]>,
}

impl ShadowPage {
    fn new() -> Self {
        let bytes: Vec<AtomicU8> = (0..SHADOW_PAGE).map(|_| AtomicU8::new(0)).collect();
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }
}

/// Shadow memory covering the whole address space at one granularity.
pub struct ShadowMap {
    granularity: Granularity,
    pages: RwLock<HashMap<usize, ShadowPage>>,
}

impl ShadowMap {
    #[must_use]
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            pages: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Number of materialized L2 pages.
    #[must_use]
    pub fn resident_pages(&self) -> usize {
        self.pages.read().len()
    }

    /// Shadow index of the granule holding `addr`.
    fn index(&self, addr: usize) -> usize {
        addr >> self.granularity.shift()
    }

    fn decompose(index: usize) -> (usize, usize) {
        (index / SHADOW_PAGE, index % SHADOW_PAGE)
    }

    /// Shadow byte of the granule containing `addr`.
    #[must_use]
    pub fn load(&self, addr: usize) -> u8 {
        let (page, slot) = Self::decompose(self.index(addr));
        let pages = self.pages.read();
        pages
            .get(&page)
            .map_or(0, |p| p.bytes[slot].load(Ordering::Relaxed))
    }

    /// Decoded state of the granule containing `addr`.
    #[must_use]
    pub fn state(&self, addr: usize) -> GranuleState {
        decode_granule(self.load(addr), self.granularity)
    }

    /// Store `bytes` into consecutive granules starting at the granule of `addr`.
    pub fn store_granules(&self, addr: usize, bytes: &[u8]) {
        let start = self.index(addr);
        let mut done = 0;
        while done < bytes.len() {
            let (page, slot) = Self::decompose(start + done);
            let chunk = (SHADOW_PAGE - slot).min(bytes.len() - done);
            let src = &bytes[done..done + chunk];

            // Fast path: page exists, or the chunk is all zeros and can stay
            // unmaterialized.
            {
                let pages = self.pages.read();
                if let Some(p) = pages.get(&page) {
                    for (dst, &b) in p.bytes[slot..slot + chunk].iter().zip(src) {
                        dst.store(b, Ordering::Relaxed);
                    }
                    done += chunk;
                    continue;
                }
                if src.iter().all(|&b| b == 0) {
                    done += chunk;
                    continue;
                }
            }

            // Slow path: materialize the page.
            let mut pages = self.pages.write();
            let p = pages.entry(page).or_insert_with(ShadowPage::new);
            for (dst, &b) in p.bytes[slot..slot + chunk].iter().zip(src) {
                dst.store(b, Ordering::Relaxed);
            }
            done += chunk;
        }
    }

    fn require_aligned(&self, addr: usize) -> Result<(), RuntimeError> {
        if self.granularity.offset_of(addr) != 0 {
            return Err(RuntimeError::Misaligned {
                addr,
                granularity: self.granularity.bytes(),
            });
        }
        Ok(())
    }

    /// Poison `redzone_size` bytes at `addr` of which the first `size` stay
    /// addressable.
    pub fn poison_redzone(
        &self,
        addr: usize,
        size: usize,
        redzone_size: usize,
        magic: ShadowMagic,
    ) -> Result<(), RuntimeError> {
        self.require_aligned(addr)?;
        let mut buf = vec![0_u8; shadow_len(redzone_size, self.granularity)];
        poison_partial_right_redzone(&mut buf, size, redzone_size, self.granularity, magic);
        self.store_granules(addr, &buf);
        Ok(())
    }

    /// Mark `len` bytes at `addr` fully unaddressable with `magic`.
    pub fn poison(&self, addr: usize, len: usize, magic: ShadowMagic) -> Result<(), RuntimeError> {
        self.poison_redzone(addr, 0, len, magic)
    }

    /// Make `len` bytes at `addr` addressable. A trailing partial granule gets
    /// its byte count.
    pub fn unpoison(&self, addr: usize, len: usize) -> Result<(), RuntimeError> {
        // No granule starts at or past `len`, so the magic is never written.
        self.poison_redzone(
            addr,
            len,
            self.granularity.round_up(len),
            ShadowMagic::HeapLeftRedzone,
        )
    }

    /// First byte of `[addr, addr + size)` that is not addressable.
    #[must_use]
    pub fn first_poisoned(&self, addr: usize, size: usize) -> Option<usize> {
        let g = self.granularity;
        let end = addr.saturating_add(size);
        let mut cur = addr;
        while cur < end {
            let base = g.round_down(cur);
            let granule_end = base.saturating_add(g.bytes()).min(end);
            match self.state(cur) {
                GranuleState::Addressable => {}
                GranuleState::Partial(n) => {
                    let limit = base + n as usize;
                    if granule_end > limit {
                        return Some(cur.max(limit));
                    }
                }
                _ => return Some(cur),
            }
            cur = granule_end;
        }
        None
    }

    /// Whether any byte of `[addr, addr + size)` is unaddressable.
    #[must_use]
    pub fn is_poisoned(&self, addr: usize, size: usize) -> bool {
        self.first_poisoned(addr, size).is_some()
    }

    /// `2 * context + 1` rows of shadow centred on the row holding `addr`.
    #[must_use]
    pub fn neighborhood(&self, addr: usize, context: usize) -> Vec<ShadowRow> {
        let g = self.granularity.bytes();
        let row_span = ROW_BYTES * g;
        let centre = addr - addr % row_span;
        let first = centre.saturating_sub(context * row_span);
        let rows = (centre - first) / row_span + context + 1;

        (0..rows)
            .filter_map(|r| first.checked_add(r * row_span))
            .map(|row_addr| {
                let mut bytes = [0_u8; ROW_BYTES];
                for (k, b) in bytes.iter_mut().enumerate() {
                    *b = row_addr.checked_add(k * g).map_or(0, |a| self.load(a));
                }
                ShadowRow {
                    app_addr: row_addr,
                    bytes,
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for ShadowMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowMap")
            .field("granularity", &self.granularity.bytes())
            .field("resident_pages", &self.resident_pages())
            .finish()
    }
}
