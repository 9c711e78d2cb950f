#![no_main]
use libfuzzer_sys::fuzz_target;
use shadowsan_core::DEFAULT_GRANULARITY;
use shadowsan_runtime::{HeapChunk, ShadowMap};

const BASE: usize = 0x10_0000;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let user_size = usize::from(u16::from_le_bytes([data[0], data[1]])) % 4096;
    let chunk = HeapChunk::new(BASE, user_size, 32);
    let shadow = ShadowMap::new(DEFAULT_GRANULARITY);
    if chunk.poison_allocated(&shadow).is_err() {
        return;
    }

    // Every (offset, len) access must agree with byte-granular addressability.
    for pair in data[2..].chunks(2) {
        let [off, len] = pair else {
            break;
        };
        let offset = usize::from(*off) * 17 % chunk.chunk_size();
        let len = usize::from(*len) % 64 + 1;
        let addr = chunk.beg + offset;
        let chunk_end = chunk.beg + chunk.chunk_size();
        let expected = (addr..addr + len).find(|&a| {
            a < chunk.user_beg() || (a >= chunk.user_beg() + user_size && a < chunk_end)
        });
        assert_eq!(shadow.first_poisoned(addr, len), expected, "access {addr:#x}+{len}");
    }
});
