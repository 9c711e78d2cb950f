//! Contract tests for the exported `__asan_*` interface.

use std::ffi::{CString, c_void};
use std::sync::Mutex;

use shadowsan_abi::asan_abi::{
    __asan_init, __asan_register_global, __asan_stack_free, __asan_stack_malloc,
    __shadowsan_is_poisoned, __shadowsan_shadow_byte,
};
use shadowsan_abi::mmap_abi::__asan_mmap;

// The runtime is process-wide; keep scenarios from interleaving.
static TEST_LOCK: Mutex<()> = Mutex::new(());

fn init() {
    // SAFETY: no arguments.
    unsafe {
        __asan_init();
        __asan_init();
    }
}

#[test]
fn register_global_poisons_trailing_redzone() {
    let _guard = TEST_LOCK.lock().unwrap();
    init();
    let name = CString::new("abi_global").unwrap();
    let addr = 0x5500_0000_usize;
    // SAFETY: `name` is a valid C string; the address is never dereferenced.
    unsafe { __asan_register_global(addr, 10, name.as_ptr()) };

    // SAFETY: shadow lookups do not touch application memory.
    unsafe {
        assert_eq!(__shadowsan_shadow_byte(addr), 0);
        assert_eq!(__shadowsan_shadow_byte(addr + 8), 2);
        assert_eq!(__shadowsan_shadow_byte(addr + 16), 0xf9);
        assert!(!__shadowsan_is_poisoned(addr, 10));
        assert!(__shadowsan_is_poisoned(addr, 11));
    }
}

#[test]
fn null_global_name_is_tolerated() {
    let _guard = TEST_LOCK.lock().unwrap();
    init();
    let addr = 0x5600_0000_usize;
    // SAFETY: null names are accepted.
    unsafe {
        __asan_register_global(addr, 32, std::ptr::null());
        assert_eq!(__shadowsan_shadow_byte(addr + 32), 0xf9);
    }
}

#[test]
fn stack_frames_round_trip() {
    let _guard = TEST_LOCK.lock().unwrap();
    init();
    let real_stack = 0x7ffd_0000_usize;
    // SAFETY: frame addresses are only handed back to the runtime.
    unsafe {
        let frame = __asan_stack_malloc(40, real_stack);
        if frame == real_stack {
            // Fake stacks disabled through SHADOWSAN_OPTIONS.
            __asan_stack_free(frame, 40, real_stack);
            return;
        }
        assert!(!__shadowsan_is_poisoned(frame, 40));
        __asan_stack_free(frame, 40, real_stack);
        assert_eq!(__shadowsan_shadow_byte(frame), 0xf5);
        assert!(__shadowsan_is_poisoned(frame, 1));
    }
}

#[test]
fn untracked_memory_reads_addressable() {
    init();
    // SAFETY: shadow lookups do not touch application memory.
    unsafe {
        assert_eq!(__shadowsan_shadow_byte(0x1234_5678), 0);
        assert!(!__shadowsan_is_poisoned(0x1234_5678, 64));
    }
}

#[test]
fn mmap_passthrough_maps_anonymous_memory() {
    let len = 4096;
    // SAFETY: anonymous private mapping, unmapped below.
    unsafe {
        let ptr = __asan_mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        );
        assert_ne!(ptr, libc::MAP_FAILED);
        let bytes = ptr.cast::<u8>();
        bytes.write(0xab);
        assert_eq!(bytes.read(), 0xab);
        assert_eq!(libc::munmap(ptr.cast::<c_void>(), len), 0);
    }
}
