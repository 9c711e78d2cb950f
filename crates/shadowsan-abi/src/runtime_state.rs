//! Process-wide runtime instance behind the ABI.
//!
//! The runtime is built on first use from `SHADOWSAN_OPTIONS` and leaked.
//! A plain atomic state machine guards construction instead of `OnceLock`:
//! building the runtime allocates, and an allocator interposed by the
//! instrumented program may call back into the ABI on the same thread. Such a
//! reentrant call sees INITIALIZING and gets `None`.

use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use shadowsan_core::runtime_flags;
use shadowsan_runtime::Runtime;

const STATE_UNINIT: u8 = 0;
const STATE_INITIALIZING: u8 = 1;
const STATE_READY: u8 = 2;

static RUNTIME_STATE: AtomicU8 = AtomicU8::new(STATE_UNINIT);
static RUNTIME_PTR: AtomicPtr<Runtime> = AtomicPtr::new(std::ptr::null_mut());

fn ready() -> Option<&'static Runtime> {
    let ptr = RUNTIME_PTR.load(Ordering::Acquire);
    // SAFETY: once READY, RUNTIME_PTR points at a leaked Runtime that is never
    // freed or replaced.
    (!ptr.is_null()).then(|| unsafe { &*ptr })
}

/// The runtime, or `None` while it is being constructed.
pub(crate) fn runtime() -> Option<&'static Runtime> {
    match RUNTIME_STATE.load(Ordering::Acquire) {
        STATE_READY => return ready(),
        STATE_INITIALIZING => return None,
        _ => {}
    }

    if RUNTIME_STATE
        .compare_exchange(
            STATE_UNINIT,
            STATE_INITIALIZING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        return if RUNTIME_STATE.load(Ordering::Acquire) == STATE_READY {
            ready()
        } else {
            None
        };
    }

    let rt = Box::new(Runtime::new(runtime_flags().clone()));
    let ptr = Box::into_raw(rt);
    RUNTIME_PTR.store(ptr, Ordering::Release);
    RUNTIME_STATE.store(STATE_READY, Ordering::Release);
    ready()
}
