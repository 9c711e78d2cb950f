//! The shadow byte contract as seen by an external reader of shadow memory.

use shadowsan_core::{
    DEFAULT_GRANULARITY, GranuleState, Granularity, ShadowMagic, WIDE_GRANULARITY, WIDE_SENTINEL,
    decode_granule, encode_granule, poison_partial_right_redzone, shadow_len,
};

fn poisoned(size: usize, redzone: usize, g: Granularity, magic: ShadowMagic) -> Vec<u8> {
    let mut shadow = vec![0x11_u8; shadow_len(redzone, g) + 2];
    poison_partial_right_redzone(&mut shadow, size, redzone, g, magic);
    shadow.truncate(shadow_len(redzone, g));
    shadow
}

#[test]
fn reference_scenarios() {
    let g8 = DEFAULT_GRANULARITY;
    assert_eq!(
        poisoned(5, 16, g8, ShadowMagic::HeapLeftRedzone),
        vec![5, 0xfa]
    );
    assert_eq!(poisoned(8, 8, g8, ShadowMagic::HeapLeftRedzone), vec![0]);
    assert_eq!(
        poisoned(0, 8, g8, ShadowMagic::StackLeftRedzone),
        vec![0xf1]
    );
    assert_eq!(
        poisoned(10, 16, g8, ShadowMagic::GlobalRedzone),
        vec![0, 2]
    );
}

#[test]
fn poisoner_leaves_trailing_bytes_alone() {
    let g = DEFAULT_GRANULARITY;
    let mut shadow = vec![0x11_u8; 6];
    poison_partial_right_redzone(&mut shadow, 3, 24, g, ShadowMagic::HeapRightRedzone);
    assert_eq!(shadow, vec![3, 0xfb, 0xfb, 0x11, 0x11, 0x11]);
}

#[test]
fn codec_law_holds_for_every_offset() {
    for g in [8, 16, 32, 64, 128] {
        let granularity = Granularity::new(g).unwrap();
        for size in 0..(3 * g) {
            for k in 0..4 {
                let offset = k * g;
                let byte = encode_granule(offset, size, granularity, ShadowMagic::HeapFreed);
                let state = decode_granule(byte, granularity);
                if offset + g <= size {
                    assert_eq!(state, GranuleState::Addressable);
                } else if offset >= size {
                    assert!(state.is_fully_poisoned(), "g={g} size={size} k={k}");
                } else {
                    assert_eq!(state, GranuleState::Partial((size - offset) as u8));
                    for b in 0..g {
                        assert_eq!(state.is_addressable_at(b), offset + b < size);
                    }
                }
            }
        }
    }
}

#[test]
fn wide_granularity_never_writes_magic() {
    let bytes = poisoned(130, 512, WIDE_GRANULARITY, ShadowMagic::StackMidRedzone);
    assert_eq!(bytes, vec![0, 2, WIDE_SENTINEL, WIDE_SENTINEL]);
    assert_eq!(
        decode_granule(WIDE_SENTINEL, WIDE_GRANULARITY),
        GranuleState::WideSentinel
    );
    assert_eq!(
        decode_granule(WIDE_SENTINEL, DEFAULT_GRANULARITY),
        GranuleState::Unknown(WIDE_SENTINEL)
    );
}

#[test]
fn every_magic_decodes_to_itself() {
    for magic in ShadowMagic::ALL {
        assert_eq!(
            decode_granule(magic.byte(), DEFAULT_GRANULARITY),
            GranuleState::Poisoned(magic)
        );
        assert_eq!(
            poisoned(0, 32, DEFAULT_GRANULARITY, magic),
            vec![magic.byte(); 4]
        );
    }
}
