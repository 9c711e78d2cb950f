//! Redzone poisoner: applies the granule codec across a whole redzone.

use crate::granule::{Granularity, encode_granule};
use crate::magic::ShadowMagic;

/// Shadow bytes needed to describe `redzone_size` application bytes.
#[inline]
#[must_use]
pub const fn shadow_len(redzone_size: usize, granularity: Granularity) -> usize {
    granularity.granules(redzone_size)
}

/// Poison the shadow of `redzone_size` application bytes of which the first
/// `size` are addressable.
///
/// Writes exactly `ceil(redzone_size / G)` bytes at the front of `shadow`,
/// granule `k` getting `encode_granule(k * G, size, G, magic)`. Re-running with
/// the same arguments reproduces the same bytes. A `shadow` buffer that is too
/// short is an engine invariant violation and aborts the process.
pub fn poison_partial_right_redzone(
    shadow: &mut [u8],
    size: usize,
    redzone_size: usize,
    granularity: Granularity,
    magic: ShadowMagic,
) {
    let needed = shadow_len(redzone_size, granularity);
    crate::shadow_check!(shadow.len() >= needed);

    let g = granularity.bytes();
    for (k, slot) in shadow[..needed].iter_mut().enumerate() {
        *slot = encode_granule(k * g, size, granularity, magic);
    }
}

/// Fill whole-granule shadow with one value (`0` to unpoison, a magic byte to
/// poison).
#[inline]
pub fn poison_shadow(shadow: &mut [u8], value: u8) {
    shadow.fill(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::granule::{DEFAULT_GRANULARITY, WIDE_GRANULARITY, WIDE_SENTINEL};

    fn poisoned(size: usize, redzone: usize, g: Granularity, magic: ShadowMagic) -> Vec<u8> {
        let mut shadow = vec![0xaa; shadow_len(redzone, g)];
        poison_partial_right_redzone(&mut shadow, size, redzone, g, magic);
        shadow
    }

    #[test]
    fn partial_then_magic() {
        let shadow = poisoned(5, 16, DEFAULT_GRANULARITY, ShadowMagic::HeapLeftRedzone);
        assert_eq!(shadow, [5, 0xfa]);
    }

    #[test]
    fn fully_addressable_redzone() {
        let shadow = poisoned(8, 8, DEFAULT_GRANULARITY, ShadowMagic::HeapRightRedzone);
        assert_eq!(shadow, [0]);
    }

    #[test]
    fn fully_poisoned_redzone() {
        let shadow = poisoned(0, 8, DEFAULT_GRANULARITY, ShadowMagic::StackLeftRedzone);
        assert_eq!(shadow, [0xf1]);
    }

    #[test]
    fn wide_granule_keeps_partial_count() {
        let shadow = poisoned(130, 256, WIDE_GRANULARITY, ShadowMagic::GlobalRedzone);
        assert_eq!(shadow, [0, 2]);
    }

    #[test]
    fn wide_granule_sentinel_replaces_magic() {
        let shadow = poisoned(5, 384, WIDE_GRANULARITY, ShadowMagic::GlobalRedzone);
        assert_eq!(shadow, [5, WIDE_SENTINEL, WIDE_SENTINEL]);
    }

    #[test]
    fn writes_only_the_needed_prefix() {
        let mut shadow = [0xaa_u8; 6];
        poison_partial_right_redzone(
            &mut shadow,
            12,
            32,
            DEFAULT_GRANULARITY,
            ShadowMagic::StackPartialRedzone,
        );
        assert_eq!(shadow, [0, 4, 0xf4, 0xf4, 0xaa, 0xaa]);
    }

    #[test]
    fn idempotent() {
        let g = DEFAULT_GRANULARITY;
        let mut first = vec![0_u8; 8];
        poison_partial_right_redzone(&mut first, 21, 64, g, ShadowMagic::HeapRightRedzone);
        let mut second = first.clone();
        poison_partial_right_redzone(&mut second, 21, 64, g, ShadowMagic::HeapRightRedzone);
        assert_eq!(first, second);
    }

    #[test]
    fn non_multiple_redzone_rounds_up() {
        let shadow = poisoned(3, 12, DEFAULT_GRANULARITY, ShadowMagic::HeapFreed);
        assert_eq!(shadow, [3, 0xfd]);
    }

    #[test]
    fn fill_helper() {
        let mut shadow = [1_u8, 2, 3];
        poison_shadow(&mut shadow, ShadowMagic::HeapFreed.byte());
        assert_eq!(shadow, [0xfd; 3]);
    }
}
