//! Instrumented stack frames.
//!
//! [`FrameLayout`] places a frame's locals between redzones and poisons them;
//! [`FakeStack`] is the per-thread bump region `stack_malloc` serves frames
//! from so they can be poisoned after return instead of being reused at once.
//! [`FakeStackTable`] owns every thread's [`FakeStack`] and drops a thread's
//! region when that thread exits.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use parking_lot::Mutex;
use shadowsan_core::ShadowMagic;

use crate::error::RuntimeError;
use crate::shadow::ShadowMap;

/// Bytes reserved per thread for fake frames.
pub const FAKE_STACK_SIZE: usize = 1 << 16;

/// One local variable inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameVar {
    /// Offset from the frame base.
    pub offset: usize,
    pub size: usize,
}

/// Placement of a frame's locals.
///
/// ```text
/// | left rz | var0 .. pad | mid rz | var1 .. pad | right rz |
/// ```
///
/// Every slot and redzone is a whole number of `unit` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    unit: usize,
    vars: Vec<FrameVar>,
    size: usize,
}

fn round_up(n: usize, unit: usize) -> Option<usize> {
    n.div_ceil(unit).checked_mul(unit)
}

impl FrameLayout {
    pub fn new(var_sizes: &[usize], unit: usize) -> Result<Self, RuntimeError> {
        if var_sizes.is_empty() {
            return Err(RuntimeError::EmptyFrame);
        }
        if !unit.is_power_of_two() || unit < 8 {
            return Err(RuntimeError::InvalidRedzoneUnit { unit });
        }
        let mut offset = unit;
        let mut vars = Vec::with_capacity(var_sizes.len());
        for &size in var_sizes {
            vars.push(FrameVar { offset, size });
            offset = round_up(size, unit)
                .and_then(|slot| slot.checked_add(unit))
                .and_then(|step| offset.checked_add(step))
                .ok_or(RuntimeError::FrameTooLarge { size })?;
        }
        Ok(Self {
            unit,
            vars,
            size: offset,
        })
    }

    /// Total frame size including every redzone.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn vars(&self) -> &[FrameVar] {
        &self.vars
    }

    #[must_use]
    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Write the frame's shadow for a frame placed at `base`.
    pub fn poison(&self, shadow: &ShadowMap, base: usize) -> Result<(), RuntimeError> {
        let unit = self.unit;
        if unit < shadow.granularity().bytes() {
            return Err(RuntimeError::InvalidRedzoneUnit { unit });
        }
        shadow.poison(base, unit, ShadowMagic::StackLeftRedzone)?;
        let last = self.vars.len() - 1;
        for (idx, var) in self.vars.iter().enumerate() {
            let addr = base + var.offset;
            let aligned = var.size - var.size % unit;
            shadow.unpoison(addr, aligned)?;
            if var.size % unit != 0 {
                shadow.poison_redzone(
                    addr + aligned,
                    var.size % unit,
                    unit,
                    ShadowMagic::StackPartialRedzone,
                )?;
            }
            let magic = if idx == last {
                ShadowMagic::StackRightRedzone
            } else {
                ShadowMagic::StackMidRedzone
            };
            shadow.poison(addr + var.size.next_multiple_of(unit), unit, magic)?;
        }
        Ok(())
    }
}

/// A thread's fake stack: LIFO bump allocation over an owned region.
pub struct FakeStack {
    region: Box<[u8]>,
    base: usize,
    capacity: usize,
    top: usize,
    frames: Vec<(usize, usize)>,
    unit: usize,
}

impl FakeStack {
    /// A region of `capacity` usable bytes whose frames are `unit`-aligned.
    #[must_use]
    pub fn new(capacity: usize, unit: usize) -> Self {
        let mut region = vec![0_u8; capacity + unit].into_boxed_slice();
        let raw = region.as_mut_ptr() as usize;
        let base = raw.next_multiple_of(unit);
        Self {
            region,
            base,
            capacity,
            top: 0,
            frames: Vec::new(),
            unit,
        }
    }

    /// Carve a frame of at least `size` bytes. Returns its address and
    /// rounded length, or `None` when the region is exhausted.
    pub fn allocate(&mut self, size: usize) -> Option<(usize, usize)> {
        let len = round_up(size.max(1), self.unit)?;
        if len > self.capacity - self.top {
            return None;
        }
        let addr = self.base + self.top;
        self.top += len;
        self.frames.push((addr, len));
        Some((addr, len))
    }

    /// Release the frame at `addr` and every frame allocated after it.
    ///
    /// Returns the released frames, newest first, or `None` if `addr` is not
    /// the start of a live frame.
    pub fn release(&mut self, addr: usize) -> Option<Vec<(usize, usize)>> {
        if !self.frames.iter().any(|&(a, _)| a == addr) {
            return None;
        }
        let mut released = Vec::new();
        while let Some(&(a, len)) = self.frames.last() {
            if a < addr {
                break;
            }
            self.frames.pop();
            released.push((a, len));
        }
        self.top = addr - self.base;
        Some(released)
    }

    /// Whether `addr` lies inside this stack's usable region.
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        (self.base..self.base + self.capacity).contains(&addr)
    }

    #[must_use]
    pub fn live_frames(&self) -> usize {
        self.frames.len()
    }

    /// Bytes currently handed out.
    #[must_use]
    pub fn used(&self) -> usize {
        self.top
    }
}

impl std::fmt::Debug for FakeStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeStack")
            .field("base", &format_args!("{:#x}", self.base))
            .field("capacity", &self.capacity)
            .field("used", &self.top)
            .field("frames", &self.frames.len())
            .field("region_len", &self.region.len())
            .finish()
    }
}

thread_local! {
    static EXIT_GUARDS: RefCell<Vec<ExitGuard>> = const { RefCell::new(Vec::new()) };
}

/// Retires one thread's fake stack when that thread's locals are destroyed.
struct ExitGuard {
    table: Weak<FakeStackTable>,
    thread: ThreadId,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.retire(self.thread);
        }
    }
}

/// Per-thread fake stacks of one runtime.
#[derive(Debug)]
pub struct FakeStackTable {
    stacks: Mutex<HashMap<ThreadId, FakeStack>>,
    shadow: Arc<ShadowMap>,
    capacity: usize,
    unit: usize,
}

impl FakeStackTable {
    #[must_use]
    pub fn new(shadow: Arc<ShadowMap>, capacity: usize, unit: usize) -> Arc<Self> {
        Arc::new(Self {
            stacks: Mutex::new(HashMap::new()),
            shadow,
            capacity,
            unit,
        })
    }

    /// Carve a frame from the calling thread's stack, creating the stack on
    /// first use.
    pub fn allocate(self: &Arc<Self>, size: usize) -> Option<(usize, usize)> {
        let thread = std::thread::current().id();
        if !self.stacks.lock().contains_key(&thread) {
            let guard = ExitGuard {
                table: Arc::downgrade(self),
                thread,
            };
            // No new stack once the thread's locals are being torn down.
            EXIT_GUARDS
                .try_with(|guards| guards.borrow_mut().push(guard))
                .ok()?;
        }
        let mut stacks = self.stacks.lock();
        stacks
            .entry(thread)
            .or_insert_with(|| FakeStack::new(self.capacity, self.unit))
            .allocate(size)
    }

    /// [`FakeStack::release`] on the calling thread's stack.
    pub fn release(&self, addr: usize) -> Option<Vec<(usize, usize)>> {
        let mut stacks = self.stacks.lock();
        stacks
            .get_mut(&std::thread::current().id())
            .and_then(|stack| stack.release(addr))
    }

    /// Whether `addr` lies in any live thread's fake stack.
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        self.stacks.lock().values().any(|stack| stack.contains(addr))
    }

    /// Threads currently holding a fake stack.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.stacks.lock().len()
    }

    fn retire(&self, thread: ThreadId) {
        let Some(stack) = self.stacks.lock().remove(&thread) else {
            return;
        };
        // The region is freed below; its shadow must not keep 0xf5.
        let _ = self.shadow.unpoison(stack.base, stack.capacity);
    }
}
