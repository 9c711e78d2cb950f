//! Runtime counters, printed on `show_stats_and_abort` and at exit when the
//! `stats` flag is set.

use std::fmt;

use shadowsan_core::{Counter, ThreadSafety};

use crate::quarantine::Quarantine;

#[derive(Debug, Default)]
pub struct Stats {
    mode: ThreadSafety,
    mallocs: Counter,
    frees: Counter,
    malloced_bytes: Counter,
    freed_bytes: Counter,
    stack_frames: Counter,
    fake_stack_fallbacks: Counter,
    globals: Counter,
    reports: Counter,
}

fn as_delta(bytes: usize) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

fn as_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl Stats {
    #[must_use]
    pub fn new(mode: ThreadSafety) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn record_malloc(&self, user_size: usize) {
        self.mallocs.increment(self.mode);
        self.malloced_bytes.add(as_delta(user_size), self.mode);
    }

    pub fn record_free(&self, user_size: usize) {
        self.frees.increment(self.mode);
        self.freed_bytes.add(as_delta(user_size), self.mode);
    }

    pub fn record_stack_frame(&self) {
        self.stack_frames.increment(self.mode);
    }

    /// `stack_malloc` had to hand back the real stack.
    pub fn record_fake_stack_fallback(&self) {
        self.fake_stack_fallbacks.increment(self.mode);
    }

    pub fn record_global(&self) {
        self.globals.increment(self.mode);
    }

    pub fn record_report(&self) {
        self.reports.increment(self.mode);
    }

    #[must_use]
    pub fn snapshot(&self, quarantine: &Quarantine) -> StatsSnapshot {
        StatsSnapshot {
            mallocs: as_count(self.mallocs.get()),
            frees: as_count(self.frees.get()),
            malloced_bytes: as_count(self.malloced_bytes.get()),
            freed_bytes: as_count(self.freed_bytes.get()),
            quarantined_chunks: quarantine.len() as u64,
            quarantined_bytes: quarantine.bytes() as u64,
            stack_frames: as_count(self.stack_frames.get()),
            fake_stack_fallbacks: as_count(self.fake_stack_fallbacks.get()),
            globals: as_count(self.globals.get()),
            reports: as_count(self.reports.get()),
        }
    }
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub mallocs: u64,
    pub frees: u64,
    pub malloced_bytes: u64,
    pub freed_bytes: u64,
    pub quarantined_chunks: u64,
    pub quarantined_bytes: u64,
    pub stack_frames: u64,
    pub fake_stack_fallbacks: u64,
    pub globals: u64,
    pub reports: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stats: {} malloc calls, {} bytes", self.mallocs, self.malloced_bytes)?;
        writeln!(f, "Stats: {} free calls, {} bytes", self.frees, self.freed_bytes)?;
        writeln!(
            f,
            "Stats: {} chunks in quarantine, {} bytes",
            self.quarantined_chunks, self.quarantined_bytes
        )?;
        writeln!(
            f,
            "Stats: {} fake stack frames, {} real stack fallbacks",
            self.stack_frames, self.fake_stack_fallbacks
        )?;
        writeln!(f, "Stats: {} globals registered", self.globals)?;
        writeln!(f, "Stats: {} errors reported", self.reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapChunk;

    #[test]
    fn counts_and_bytes_accumulate() {
        let stats = Stats::new(ThreadSafety::Single);
        stats.record_malloc(100);
        stats.record_malloc(28);
        stats.record_free(100);
        stats.record_global();
        stats.record_stack_frame();
        stats.record_fake_stack_fallback();

        let quarantine = Quarantine::new(1 << 20, ThreadSafety::Single);
        quarantine.push(HeapChunk::new(0x1000, 100, 32));
        let snap = stats.snapshot(&quarantine);
        assert_eq!(snap.mallocs, 2);
        assert_eq!(snap.malloced_bytes, 128);
        assert_eq!(snap.frees, 1);
        assert_eq!(snap.freed_bytes, 100);
        assert_eq!(snap.quarantined_chunks, 1);
        assert_eq!(snap.quarantined_bytes, 32 + 128 + 32);
        assert_eq!(snap.globals, 1);
        assert_eq!(snap.reports, 0);

        let text = snap.to_string();
        assert!(text.contains("2 malloc calls, 128 bytes"));
        assert!(text.contains("1 fake stack frames, 1 real stack fallbacks"));
    }

    #[test]
    fn concurrent_recording_in_multi_mode() {
        let stats = std::sync::Arc::new(Stats::new(ThreadSafety::Multi));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = std::sync::Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        stats.record_malloc(8);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snap = stats.snapshot(&Quarantine::new(0, ThreadSafety::Multi));
        assert_eq!(snap.mallocs, 2000);
        assert_eq!(snap.malloced_bytes, 16_000);
    }
}
