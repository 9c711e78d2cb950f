//! Granule codec: one shadow byte per granule of application memory.

use crate::error::FlagError;
use crate::magic::ShadowMagic;

/// Canonical granule size (8 application bytes per shadow byte).
pub const DEFAULT_GRANULARITY: Granularity = Granularity(8);

/// Wide granule size. Fully unaddressable wide granules carry [`WIDE_SENTINEL`]
/// instead of a magic value.
pub const WIDE_GRANULARITY: Granularity = Granularity(128);

/// Shadow value of a fully unaddressable granule when `G = 128`.
pub const WIDE_SENTINEL: u8 = 0xff;

/// Smallest and largest supported granule sizes.
const MIN_GRANULE: usize = 8;
const MAX_GRANULE: usize = 128;

/// Number of application bytes covered by one shadow byte.
///
/// Always a power of two in `8..=128`, so partial counts `1..G-1` never reach
/// the magic range `0x80..=0xff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Granularity(usize);

impl Granularity {
    /// Validate a granule size.
    pub fn new(bytes: usize) -> Result<Self, FlagError> {
        if !bytes.is_power_of_two() || !(MIN_GRANULE..=MAX_GRANULE).contains(&bytes) {
            return Err(FlagError::InvalidGranularity { bytes });
        }
        Ok(Self(bytes))
    }

    /// Granule size in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        self.0
    }

    /// `log2(G)`: the shift from application address to shadow index.
    #[must_use]
    pub const fn shift(self) -> u32 {
        self.0.trailing_zeros()
    }

    /// True for the 128-byte variant that replaces magic values with `0xff`.
    #[must_use]
    pub const fn is_wide(self) -> bool {
        self.0 == WIDE_GRANULARITY.0
    }

    /// Offset of `addr` inside its granule.
    #[must_use]
    pub const fn offset_of(self, addr: usize) -> usize {
        addr & (self.0 - 1)
    }

    #[must_use]
    pub const fn round_down(self, n: usize) -> usize {
        n & !(self.0 - 1)
    }

    #[must_use]
    pub const fn round_up(self, n: usize) -> usize {
        (n + self.0 - 1) & !(self.0 - 1)
    }

    /// Number of granules needed to cover `len` bytes.
    #[must_use]
    pub const fn granules(self, len: usize) -> usize {
        len.div_ceil(self.0)
    }
}

impl Default for Granularity {
    fn default() -> Self {
        DEFAULT_GRANULARITY
    }
}

/// Shadow byte for the granule starting `offset` bytes into a redzone whose
/// first `size` bytes are addressable.
///
/// - `offset + G <= size`: `0`, the whole granule is addressable.
/// - `offset >= size`: `magic`, or [`WIDE_SENTINEL`] when `G = 128`.
/// - otherwise: `size - offset`, always in `1..G`.
#[inline]
#[must_use]
pub const fn encode_granule(
    offset: usize,
    size: usize,
    granularity: Granularity,
    magic: ShadowMagic,
) -> u8 {
    let g = granularity.bytes();
    if offset + g <= size {
        0
    } else if offset >= size {
        if granularity.is_wide() {
            WIDE_SENTINEL
        } else {
            magic as u8
        }
    } else {
        (size - offset) as u8
    }
}

/// Decoded meaning of one shadow byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GranuleState {
    /// All `G` bytes addressable.
    Addressable,
    /// Only the first `n` bytes are addressable.
    Partial(u8),
    /// Entire granule unaddressable, classified by a magic value.
    Poisoned(ShadowMagic),
    /// Entire granule unaddressable, unclassified (`G = 128`).
    WideSentinel,
    /// A byte outside the encoding. Readers treat it as unaddressable.
    Unknown(u8),
}

impl GranuleState {
    /// Whether the byte at `offset` inside the granule may be accessed.
    #[must_use]
    pub const fn is_addressable_at(self, offset: usize) -> bool {
        match self {
            Self::Addressable => true,
            Self::Partial(n) => offset < n as usize,
            Self::Poisoned(_) | Self::WideSentinel | Self::Unknown(_) => false,
        }
    }

    /// Whether no byte of the granule may be accessed.
    #[must_use]
    pub const fn is_fully_poisoned(self) -> bool {
        matches!(
            self,
            Self::Poisoned(_) | Self::WideSentinel | Self::Unknown(_)
        )
    }
}

/// Inverse of [`encode_granule`] for readers of shadow memory.
#[must_use]
pub const fn decode_granule(byte: u8, granularity: Granularity) -> GranuleState {
    if byte == 0 {
        return GranuleState::Addressable;
    }
    if (byte as usize) < granularity.bytes() && byte < 0x80 {
        return GranuleState::Partial(byte);
    }
    if byte == WIDE_SENTINEL && granularity.is_wide() {
        return GranuleState::WideSentinel;
    }
    match ShadowMagic::from_byte(byte) {
        Some(magic) => GranuleState::Poisoned(magic),
        None => GranuleState::Unknown(byte),
    }
}
