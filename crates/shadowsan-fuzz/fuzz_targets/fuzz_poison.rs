#![no_main]
use libfuzzer_sys::fuzz_target;
use shadowsan_core::{
    GranuleState, Granularity, ShadowMagic, decode_granule, poison_partial_right_redzone,
    shadow_len,
};

fuzz_target!(|data: &[u8]| {
    if data.len() < 6 {
        return;
    }
    let granularity = if data[0] & 1 == 0 {
        Granularity::new(8)
    } else {
        Granularity::new(128)
    };
    let Ok(granularity) = granularity else {
        return;
    };
    let magic = ShadowMagic::ALL[usize::from(data[1]) % ShadowMagic::ALL.len()];
    let redzone = usize::from(u16::from_le_bytes([data[2], data[3]]));
    let size = usize::from(u16::from_le_bytes([data[4], data[5]])) % (redzone + 1);

    let len = shadow_len(redzone, granularity);
    let mut shadow = vec![0x5a_u8; len + 1];
    poison_partial_right_redzone(&mut shadow, size, redzone, granularity, magic);
    assert_eq!(shadow[len], 0x5a, "poisoner wrote past ceil(rz/G)");

    let first = shadow[..len].to_vec();
    poison_partial_right_redzone(&mut shadow, size, redzone, granularity, magic);
    assert_eq!(&shadow[..len], &first[..], "poisoner is not idempotent");

    let g = granularity.bytes();
    for (k, &byte) in shadow[..len].iter().enumerate() {
        let state = decode_granule(byte, granularity);
        for b in 0..g {
            assert_eq!(
                state.is_addressable_at(b),
                k * g + b < size,
                "granule {k} byte {b}: {state:?}"
            );
        }
        if granularity.is_wide() {
            assert!(!matches!(state, GranuleState::Poisoned(_)));
        }
    }
});
