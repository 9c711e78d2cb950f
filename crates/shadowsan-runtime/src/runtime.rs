//! The runtime facade instrumented code talks to.
//!
//! [`SanitizerRuntime`] is the seam between the C ABI exports and the engine:
//! the ABI crate forwards each `__asan_*` entry point to one trait method. The
//! fatal entry points (`report_error`, `check_failed`, `show_stats_and_abort`)
//! never return.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use shadowsan_core::{RuntimeFlags, ShadowMagic, shadow_check, validate_taxonomy};

use crate::error::RuntimeError;
use crate::fake_stack::{FAKE_STACK_SIZE, FakeStackTable};
use crate::globals::{GlobalDescriptor, GlobalRegistry};
use crate::heap::HeapChunk;
use crate::quarantine::Quarantine;
use crate::report::{AccessInfo, BugKind, ErrorReport};
use crate::shadow::ShadowMap;
use crate::stats::{Stats, StatsSnapshot};

/// Operations exported to instrumented code.
pub trait SanitizerRuntime {
    /// One-time initialization. Later calls are no-ops.
    fn init(&self);

    /// Register an instrumented global and poison its redzone.
    fn register_global(&self, addr: usize, size: usize, name: &str);

    /// Report a bad access of `1 << log_access_size` bytes at `addr` and
    /// terminate.
    fn report_error(&self, addr: usize, is_write: bool, log_access_size: u32) -> !;

    /// Frame storage for an instrumented function. Returns `real_stack` when
    /// no fake frame is available.
    fn stack_malloc(&self, size: usize, real_stack: usize) -> usize;

    /// Release a frame obtained from [`stack_malloc`](Self::stack_malloc).
    fn stack_free(&self, ptr: usize, size: usize, real_stack: usize);

    /// Internal invariant failure.
    fn check_failed(&self, condition: &str, file: &str, line: u32) -> ! {
        shadowsan_core::check_failed(condition, file, line)
    }

    /// Print counters and terminate.
    fn show_stats_and_abort(&self) -> !;
}

/// The shadowsan runtime: shadow, registries and counters behind one handle.
#[derive(Debug)]
pub struct Runtime {
    flags: RuntimeFlags,
    shadow: Arc<ShadowMap>,
    globals: GlobalRegistry,
    live_chunks: Mutex<BTreeMap<usize, HeapChunk>>,
    quarantine: Quarantine,
    stats: Stats,
    fake_stacks: Arc<FakeStackTable>,
    initialized: AtomicBool,
}

impl Runtime {
    #[must_use]
    pub fn new(flags: RuntimeFlags) -> Self {
        let mode = flags.thread_safety();
        let shadow = Arc::new(ShadowMap::new(flags.granularity));
        Self {
            fake_stacks: FakeStackTable::new(
                Arc::clone(&shadow),
                FAKE_STACK_SIZE,
                flags.frame_redzone(),
            ),
            shadow,
            globals: GlobalRegistry::new(),
            live_chunks: Mutex::new(BTreeMap::new()),
            quarantine: Quarantine::new(flags.quarantine_size, mode),
            stats: Stats::new(mode),
            initialized: AtomicBool::new(false),
            flags,
        }
    }

    #[must_use]
    pub fn flags(&self) -> &RuntimeFlags {
        &self.flags
    }

    #[must_use]
    pub fn shadow(&self) -> &ShadowMap {
        &self.shadow
    }

    #[must_use]
    pub fn globals(&self) -> &GlobalRegistry {
        &self.globals
    }

    #[must_use]
    pub fn quarantine(&self) -> &Quarantine {
        &self.quarantine
    }

    /// Threads currently holding a fake stack.
    #[must_use]
    pub fn fake_stack_threads(&self) -> usize {
        self.fake_stacks.threads()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Fallible form of [`SanitizerRuntime::register_global`].
    pub fn try_register_global(
        &self,
        addr: usize,
        size: usize,
        name: &str,
    ) -> Result<(), RuntimeError> {
        self.globals.register(
            GlobalDescriptor::new(addr, size, name),
            &self.shadow,
            self.flags.frame_redzone(),
        )?;
        self.stats.record_global();
        if self.flags.verbosity > 1 {
            eprintln!("==shadowsan== global '{name}' at 0x{addr:x} size {size}");
        }
        Ok(())
    }

    /// Classify a bad access and attach the best location description.
    #[must_use]
    pub fn describe_error(&self, addr: usize, is_write: bool, log_access_size: u32) -> ErrorReport {
        let report = ErrorReport::build(
            &self.shadow,
            AccessInfo::from_log_size(addr, is_write, log_access_size),
        );
        let bad = report.bad_addr;
        let location = match report.bug {
            BugKind::GlobalBufferOverflow => self.globals.describe_address(bad),
            BugKind::HeapUseAfterFree => {
                self.quarantine.find(bad).and_then(|c| c.describe(bad))
            }
            BugKind::HeapBufferOverflow => self.live_chunk_at(bad).and_then(|c| c.describe(bad)),
            BugKind::StackUseAfterReturn => self
                .fake_stacks
                .contains(bad)
                .then(|| format!("0x{bad:012x} is located in a returned fake stack frame")),
            _ => None,
        };
        report.with_location(location)
    }

    fn live_chunk_at(&self, addr: usize) -> Option<HeapChunk> {
        let chunks = self.live_chunks.lock();
        chunks
            .range(..=addr)
            .next_back()
            .map(|(_, c)| *c)
            .filter(|c| c.contains(addr))
    }

    /// An allocator driver handed out `chunk`. On error nothing is recorded.
    pub fn on_heap_allocated(&self, chunk: HeapChunk) -> Result<(), RuntimeError> {
        chunk.validate(self.flags.granularity)?;
        {
            let mut chunks = self.live_chunks.lock();
            let overlaps_below = chunks
                .range(..=chunk.beg)
                .next_back()
                .is_some_and(|(_, c)| c.contains(chunk.beg));
            let overlaps_above = chunks
                .range(chunk.beg..)
                .next()
                .is_some_and(|(&beg, _)| chunk.contains(beg));
            if overlaps_below || overlaps_above {
                return Err(RuntimeError::ChunkOverlap { addr: chunk.beg });
            }
            if self.flags.poison_shadow {
                chunk.poison_allocated(&self.shadow)?;
            }
            chunks.insert(chunk.beg, chunk);
        }
        self.stats.record_malloc(chunk.user_size);
        Ok(())
    }

    /// The application freed the allocation at `user_beg`. The chunk goes into
    /// quarantine; chunks evicted from it are returned for reuse.
    pub fn on_heap_freed(&self, user_beg: usize) -> Result<Vec<HeapChunk>, RuntimeError> {
        let chunk = {
            let mut chunks = self.live_chunks.lock();
            // Chunks are disjoint and start below their user region.
            let beg = chunks
                .range(..user_beg)
                .next_back()
                .filter(|(_, c)| c.user_beg() == user_beg)
                .map(|(&beg, _)| beg)
                .ok_or(RuntimeError::NotAllocated { addr: user_beg })?;
            chunks
                .remove(&beg)
                .ok_or(RuntimeError::NotAllocated { addr: user_beg })?
        };
        if self.flags.poison_shadow {
            chunk.poison_freed(&self.shadow)?;
        }
        self.stats.record_free(chunk.user_size);
        Ok(self.quarantine.push(chunk))
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(&self.quarantine)
    }

    /// Print the counters to stderr.
    pub fn show_stats(&self) -> StatsSnapshot {
        let snapshot = self.stats();
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "{snapshot}");
        snapshot
    }

    fn require_initialized(&self) {
        shadow_check!(self.is_initialized());
    }
}

impl SanitizerRuntime for Runtime {
    fn init(&self) {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if let Err(byte) = validate_taxonomy(&ShadowMagic::ALL) {
            shadowsan_core::check_failed(
                &format!("shadow magic 0x{byte:02x} collides"),
                file!(),
                line!(),
            );
        }
        if self.flags.verbosity > 0 {
            eprintln!(
                "==shadowsan== init: granularity={} redzone={} quarantine_size={} mt={}",
                self.flags.granularity.bytes(),
                self.flags.redzone,
                self.flags.quarantine_size,
                self.flags.mt
            );
        }
    }

    fn register_global(&self, addr: usize, size: usize, name: &str) {
        self.require_initialized();
        if let Err(err) = self.try_register_global(addr, size, name) {
            shadowsan_core::check_failed(&err.to_string(), file!(), line!());
        }
    }

    fn report_error(&self, addr: usize, is_write: bool, log_access_size: u32) -> ! {
        self.stats.record_report();
        let report = self.describe_error(addr, is_write, log_access_size);
        {
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "{report}");
            let _ = stderr.flush();
        }
        if self.flags.stats != 0 {
            self.show_stats();
        }
        std::process::abort()
    }

    fn stack_malloc(&self, size: usize, real_stack: usize) -> usize {
        self.require_initialized();
        if !self.flags.use_fake_stack {
            return real_stack;
        }
        let Some((addr, len)) = self.fake_stacks.allocate(size) else {
            self.stats.record_fake_stack_fallback();
            return real_stack;
        };
        if let Err(err) = self.shadow.unpoison(addr, len) {
            shadowsan_core::check_failed(&err.to_string(), file!(), line!());
        }
        self.stats.record_stack_frame();
        addr
    }

    fn stack_free(&self, ptr: usize, size: usize, real_stack: usize) {
        if ptr == real_stack {
            return;
        }
        let Some(released) = self.fake_stacks.release(ptr) else {
            shadowsan_core::check_failed("stack_free of an unknown fake frame", file!(), line!());
        };
        for (addr, len) in released {
            if addr == ptr {
                shadow_check!(len >= size);
            }
            if let Err(err) = self.shadow.poison(addr, len, ShadowMagic::StackAfterReturn) {
                shadowsan_core::check_failed(&err.to_string(), file!(), line!());
            }
        }
    }

    fn show_stats_and_abort(&self) -> ! {
        self.show_stats();
        std::process::abort()
    }
}
