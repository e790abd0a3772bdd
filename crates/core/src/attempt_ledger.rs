//! Per-user bounded ring of liquidation attempt records.
//!
//! No direct teacher counterpart — `liquidator.rs`'s `LiquidationResult` is a one-shot
//! return value, not a retained history. The bounded-ring shape is grounded on the
//! teacher's `SmallVec<TriggerEntry, 4>` bounded-collection idiom (`position.rs`),
//! generalized to a runtime-sized `VecDeque` since the ring size is a config value here.

use std::collections::VecDeque;

use alloy::primitives::{Address, B256};
use dashmap::DashMap;

/// Default ring size per user.
pub const DEFAULT_RING_SIZE: usize = 10;

/// Terminal or in-flight state of one liquidation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Pending,
    Sent,
    Included,
    Reverted,
    Error,
    SkipNoPair,
    Failed,
}

/// A single recorded attempt against a user.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub user: Address,
    pub timestamp_ms: u64,
    pub status: AttemptStatus,
    pub tx_hash: Option<B256>,
    pub nonce: Option<u64>,
    pub error: Option<String>,
}

/// Aggregate counts by status, for the heartbeat summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptStats {
    pub pending: u64,
    pub sent: u64,
    pub included: u64,
    pub reverted: u64,
    pub error: u64,
    pub skip_no_pair: u64,
    pub failed: u64,
}

/// Per-user bounded ring of attempt records.
pub struct AttemptLedger {
    ledger: DashMap<Address, VecDeque<AttemptRecord>>,
    ring_size: usize,
}

impl AttemptLedger {
    pub fn new(ring_size: usize) -> Self {
        Self {
            ledger: DashMap::new(),
            ring_size,
        }
    }

    /// Appends a record, trimming the oldest entry once the ring is full.
    pub fn record(&self, record: AttemptRecord) {
        let mut ring = self.ledger.entry(record.user).or_default();
        if ring.len() >= self.ring_size {
            ring.pop_front();
        }
        ring.push_back(record);
    }

    /// True iff the user's most recent record is still `Pending`.
    pub fn has_pending(&self, user: &Address) -> bool {
        self.ledger
            .get(user)
            .and_then(|ring| ring.back().map(|r| r.status == AttemptStatus::Pending))
            .unwrap_or(false)
    }

    pub fn history(&self, user: &Address) -> Vec<AttemptRecord> {
        self.ledger
            .get(user)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> AttemptStats {
        let mut stats = AttemptStats::default();
        for ring in self.ledger.iter() {
            for record in ring.value() {
                match record.status {
                    AttemptStatus::Pending => stats.pending += 1,
                    AttemptStatus::Sent => stats.sent += 1,
                    AttemptStatus::Included => stats.included += 1,
                    AttemptStatus::Reverted => stats.reverted += 1,
                    AttemptStatus::Error => stats.error += 1,
                    AttemptStatus::SkipNoPair => stats.skip_no_pair += 1,
                    AttemptStatus::Failed => stats.failed += 1,
                }
            }
        }
        stats
    }
}

impl Default for AttemptLedger {
    fn default() -> Self {
        Self::new(DEFAULT_RING_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: Address, status: AttemptStatus) -> AttemptRecord {
        AttemptRecord {
            user,
            timestamp_ms: 0,
            status,
            tx_hash: None,
            nonce: None,
            error: None,
        }
    }

    #[test]
    fn pending_blocks_reentry_until_terminal_status() {
        let ledger = AttemptLedger::new(10);
        let user = Address::repeat_byte(1);
        ledger.record(record(user, AttemptStatus::Pending));
        assert!(ledger.has_pending(&user));

        ledger.record(record(user, AttemptStatus::Included));
        assert!(!ledger.has_pending(&user));
    }

    #[test]
    fn ring_drops_oldest_beyond_capacity() {
        let ledger = AttemptLedger::new(2);
        let user = Address::repeat_byte(1);
        ledger.record(record(user, AttemptStatus::Error));
        ledger.record(record(user, AttemptStatus::Failed));
        ledger.record(record(user, AttemptStatus::Pending));

        let history = ledger.history(&user);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, AttemptStatus::Failed);
        assert_eq!(history[1].status, AttemptStatus::Pending);
    }

    #[test]
    fn stats_aggregate_across_users() {
        let ledger = AttemptLedger::new(10);
        ledger.record(record(Address::repeat_byte(1), AttemptStatus::Pending));
        ledger.record(record(Address::repeat_byte(2), AttemptStatus::Reverted));
        let stats = ledger.stats();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.reverted, 1);
    }
}
