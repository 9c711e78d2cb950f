//! FIFO quarantine of freed heap chunks.
//!
//! A freed chunk stays poisoned with [`ShadowMagic::HeapFreed`] until the
//! total size of newer frees pushes it past the byte budget. Evicted chunks are
//! handed back to the allocator driver for reuse.
//!
//! [`ShadowMagic::HeapFreed`]: shadowsan_core::ShadowMagic::HeapFreed

use std::collections::VecDeque;

use parking_lot::Mutex;
use shadowsan_core::{Counter, ThreadSafety};

use crate::heap::HeapChunk;

#[derive(Debug)]
pub struct Quarantine {
    budget: usize,
    queue: Mutex<VecDeque<HeapChunk>>,
    bytes: Counter,
    mode: ThreadSafety,
}

fn cost(chunk: &HeapChunk) -> i64 {
    i64::try_from(chunk.chunk_size()).unwrap_or(i64::MAX)
}

impl Quarantine {
    #[must_use]
    pub fn new(budget: usize, mode: ThreadSafety) -> Self {
        Self {
            budget,
            queue: Mutex::new(VecDeque::new()),
            bytes: Counter::new(0),
            mode,
        }
    }

    /// Quarantine `chunk` and return the chunks evicted to stay within budget,
    /// oldest first. A zero budget evicts the chunk immediately.
    pub fn push(&self, chunk: HeapChunk) -> Vec<HeapChunk> {
        let budget = i64::try_from(self.budget).unwrap_or(i64::MAX);
        let mut queue = self.queue.lock();
        queue.push_back(chunk);
        let mut total = self.bytes.add(cost(&chunk), self.mode);

        let mut evicted = Vec::new();
        while total > budget {
            let Some(oldest) = queue.pop_front() else {
                break;
            };
            total = self.bytes.sub(cost(&oldest), self.mode);
            evicted.push(oldest);
        }
        evicted
    }

    /// The quarantined chunk containing `addr`, if any.
    #[must_use]
    pub fn find(&self, addr: usize) -> Option<HeapChunk> {
        self.queue
            .lock()
            .iter()
            .rev()
            .find(|c| c.contains(addr))
            .copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Bytes currently held, counting redzones.
    #[must_use]
    pub fn bytes(&self) -> usize {
        usize::try_from(self.bytes.get()).unwrap_or(0)
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(beg: usize) -> HeapChunk {
        // 32 + 32 + 32 = 96 bytes.
        HeapChunk::new(beg, 16, 32)
    }

    #[test]
    fn evicts_oldest_first() {
        let q = Quarantine::new(200, ThreadSafety::Multi);
        assert!(q.push(chunk(0x1000)).is_empty());
        assert!(q.push(chunk(0x2000)).is_empty());
        assert_eq!(q.bytes(), 192);

        let evicted = q.push(chunk(0x3000));
        assert_eq!(evicted, vec![chunk(0x1000)]);
        assert_eq!(q.len(), 2);
        assert_eq!(q.bytes(), 192);
    }

    #[test]
    fn zero_budget_passes_chunks_through() {
        let q = Quarantine::new(0, ThreadSafety::Single);
        assert_eq!(q.push(chunk(0x1000)), vec![chunk(0x1000)]);
        assert!(q.is_empty());
        assert_eq!(q.bytes(), 0);
    }

    #[test]
    fn find_locates_quarantined_chunk() {
        let q = Quarantine::new(1 << 20, ThreadSafety::Multi);
        q.push(chunk(0x1000));
        q.push(chunk(0x2000));
        assert_eq!(q.find(0x2030), Some(chunk(0x2000)));
        assert_eq!(q.find(0x5000), None);
    }
}
