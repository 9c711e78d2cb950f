//! Counters whose synchronization cost depends on the thread-safety mode.
//!
//! In [`ThreadSafety::Multi`] every update is a hardware fetch-add and updates
//! are linearizable. In [`ThreadSafety::Single`] an update is a plain load
//! followed by a plain store, which skips the locked RMW instruction. That is
//! only correct while the caller guarantees a single mutator (early startup,
//! builds without threads).

use std::sync::atomic::{AtomicI64, Ordering};

/// Process-wide threading mode, normally taken from the `mt` flag once at
/// startup and not changed afterwards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadSafety {
    /// No concurrent mutators: plain read-modify-write.
    Single,
    /// Any number of concurrent mutators: atomic fetch-add.
    #[default]
    Multi,
}

impl ThreadSafety {
    #[must_use]
    pub const fn from_mt_flag(mt: bool) -> Self {
        if mt { Self::Multi } else { Self::Single }
    }

    #[must_use]
    pub const fn is_multi(self) -> bool {
        matches!(self, Self::Multi)
    }
}

/// A shared signed counter (allocation totals, quarantine bytes, ...).
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
}

impl Counter {
    #[must_use]
    pub const fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    /// Add one and return the updated value.
    #[inline]
    pub fn increment(&self, mode: ThreadSafety) -> i64 {
        self.add(1, mode)
    }

    /// Subtract one and return the updated value.
    #[inline]
    pub fn decrement(&self, mode: ThreadSafety) -> i64 {
        self.add(-1, mode)
    }

    /// Add `delta` and return the updated value. The mode is read on every
    /// call.
    #[inline]
    pub fn add(&self, delta: i64, mode: ThreadSafety) -> i64 {
        match mode {
            ThreadSafety::Single => {
                let next = self.value.load(Ordering::Relaxed).wrapping_add(delta);
                self.value.store(next, Ordering::Relaxed);
                next
            }
            ThreadSafety::Multi => self
                .value
                .fetch_add(delta, Ordering::AcqRel)
                .wrapping_add(delta),
        }
    }

    /// Subtract `delta` and return the updated value.
    #[inline]
    pub fn sub(&self, delta: i64, mode: ThreadSafety) -> i64 {
        self.add(delta.wrapping_neg(), mode)
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }
}
