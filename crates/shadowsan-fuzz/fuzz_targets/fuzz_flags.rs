#![no_main]
use libfuzzer_sys::fuzz_target;
use shadowsan_core::RuntimeFlags;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(flags) = RuntimeFlags::parse(raw) {
        assert!(flags.redzone.is_power_of_two());
        assert!(flags.redzone >= flags.granularity.bytes());
        assert!(flags.frame_redzone() >= flags.granularity.bytes());
    }
});
