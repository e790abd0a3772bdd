//! De-duplicating queue of addresses pending re-verification.
//!
//! Generalizes the teacher's single `mpsc::channel::<Address>(100)` liquidation-request
//! queue (`scanner.rs::run`) into a dedicating set: many producers (event listeners,
//! the predictive loop) mark addresses dirty for free, and the Verifier Loop drains
//! bounded batches on its own schedule instead of reacting to every channel message.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::Address;
use dashmap::DashSet;

/// Dedup set of addresses awaiting a health-factor re-check.
pub struct DirtyQueue {
    pending: DashSet<Address>,
    total_marked: AtomicU64,
    total_processed: AtomicU64,
}

impl DirtyQueue {
    pub fn new() -> Self {
        Self {
            pending: DashSet::new(),
            total_marked: AtomicU64::new(0),
            total_processed: AtomicU64::new(0),
        }
    }

    /// Mark an address dirty. Idempotent: marking twice before a drain is a no-op
    /// beyond the counter.
    pub fn mark_dirty(&self, address: Address) {
        self.total_marked.fetch_add(1, Ordering::Relaxed);
        self.pending.insert(address);
    }

    /// Remove and return up to `max` pending addresses. No ordering guarantee.
    pub fn take_batch(&self, max: usize) -> Vec<Address> {
        let mut batch = Vec::with_capacity(max.min(self.pending.len()));
        for entry in self.pending.iter().take(max) {
            batch.push(*entry.key());
        }
        for addr in &batch {
            self.pending.remove(addr);
        }
        self.total_processed
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        batch
    }

    pub fn size(&self) -> usize {
        self.pending.len()
    }

    pub fn total_marked(&self) -> u64 {
        self.total_marked.load(Ordering::Relaxed)
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed.load(Ordering::Relaxed)
    }
}

impl Default for DirtyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_dirty_is_idempotent_on_queue_size() {
        let queue = DirtyQueue::new();
        let addr = Address::repeat_byte(1);
        queue.mark_dirty(addr);
        queue.mark_dirty(addr);
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.total_marked(), 2);
    }

    #[test]
    fn take_batch_respects_max_and_removes_entries() {
        let queue = DirtyQueue::new();
        for i in 0..5u8 {
            queue.mark_dirty(Address::repeat_byte(i));
        }
        let batch = queue.take_batch(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.total_processed(), 3);
    }

    #[test]
    fn take_batch_on_empty_queue_returns_empty() {
        let queue = DirtyQueue::new();
        assert!(queue.take_batch(10).is_empty());
    }
}
