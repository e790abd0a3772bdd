//! Periodic heartbeat log: a single line per interval summarizing the state of every
//! subsystem, for operators tailing logs rather than a metrics backend.
//!
//! Grounded on `scanner.rs::heartbeat_cycle`'s periodic-log shape
//! (`interval.tick().await` + a structured `info!` line) repurposing `heartbeat.rs`'s
//! `HeartbeatPredictor` role as "the thing that reports liveness on a timer" — the
//! oracle-staleness prediction model itself has no counterpart here since price
//! freshness is already enforced inline by [`crate::price_math::PriceMath`].

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::attempt_ledger::AttemptLedger;
use crate::dirty_queue::DirtyQueue;
use crate::plan_cache::PlanCache;
use crate::price_math::PriceMath;
use crate::price_stream::PriceStream;
use crate::risk_set::ActiveRiskSet;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// A single heartbeat observation, also returned from [`HeartbeatMetrics::snapshot`] for
/// tests and for any future external reporting.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSnapshot {
    pub risk_set_len: usize,
    pub risk_set_evictions: u64,
    pub min_actionable_hf: Option<f64>,
    pub dirty_queue_size: usize,
    pub dirty_queue_total_marked: u64,
    pub dirty_queue_total_processed: u64,
    pub plan_cache_len: usize,
    pub plan_cache_hits: u64,
    pub plan_cache_misses: u64,
    pub attempts_pending: u64,
    pub attempts_reverted: u64,
    pub price_cache_hits: u64,
    pub price_feed_hits: u64,
    pub price_stream_reconnects: u64,
}

pub struct HeartbeatMetrics {
    interval: Duration,
    risk_set: Arc<ActiveRiskSet>,
    dirty_queue: Arc<DirtyQueue>,
    plan_cache: Arc<PlanCache>,
    attempt_ledger: Arc<AttemptLedger>,
    price_math: Arc<PriceMath>,
    price_stream: Arc<PriceStream>,
}

impl HeartbeatMetrics {
    pub fn new(
        risk_set: Arc<ActiveRiskSet>,
        dirty_queue: Arc<DirtyQueue>,
        plan_cache: Arc<PlanCache>,
        attempt_ledger: Arc<AttemptLedger>,
        price_math: Arc<PriceMath>,
        price_stream: Arc<PriceStream>,
    ) -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            risk_set,
            dirty_queue,
            plan_cache,
            attempt_ledger,
            price_math,
            price_stream,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn snapshot(&self) -> HeartbeatSnapshot {
        let plan_counters = self.plan_cache.counters();
        let attempt_stats = self.attempt_ledger.stats();
        let price_counters = self.price_math.counters();

        HeartbeatSnapshot {
            risk_set_len: self.risk_set.len(),
            risk_set_evictions: self.risk_set.evictions(),
            min_actionable_hf: self.risk_set.min_actionable_hf(),
            dirty_queue_size: self.dirty_queue.size(),
            dirty_queue_total_marked: self.dirty_queue.total_marked(),
            dirty_queue_total_processed: self.dirty_queue.total_processed(),
            plan_cache_len: self.plan_cache.len(),
            plan_cache_hits: plan_counters.hits,
            plan_cache_misses: plan_counters.misses,
            attempts_pending: attempt_stats.pending,
            attempts_reverted: attempt_stats.reverted,
            price_cache_hits: price_counters.cache,
            price_feed_hits: price_counters.feed,
            price_stream_reconnects: self.price_stream.reconnects(),
        }
    }

    fn log_snapshot(&self) {
        let s = self.snapshot();
        info!(
            risk_set_len = s.risk_set_len,
            risk_set_evictions = s.risk_set_evictions,
            min_actionable_hf = ?s.min_actionable_hf,
            dirty_queue_size = s.dirty_queue_size,
            dirty_queue_total_marked = s.dirty_queue_total_marked,
            dirty_queue_total_processed = s.dirty_queue_total_processed,
            plan_cache_len = s.plan_cache_len,
            plan_cache_hits = s.plan_cache_hits,
            plan_cache_misses = s.plan_cache_misses,
            attempts_pending = s.attempts_pending,
            attempts_reverted = s.attempts_reverted,
            price_cache_hits = s.price_cache_hits,
            price_feed_hits = s.price_feed_hits,
            price_stream_reconnects = s.price_stream_reconnects,
            "heartbeat"
        );
    }

    /// Logs a snapshot on a fixed interval until `shutdown` fires.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.log_snapshot(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_component_state() {
        let risk_set = Arc::new(ActiveRiskSet::default());
        let dirty_queue = Arc::new(DirtyQueue::new());
        let plan_cache = Arc::new(PlanCache::default());
        let attempt_ledger = Arc::new(AttemptLedger::default());
        let price_math = Arc::new(PriceMath::new(None));
        let price_stream = Arc::new(PriceStream::new(String::new(), Vec::new(), price_math.clone()));

        dirty_queue.mark_dirty(alloy::primitives::Address::repeat_byte(1));

        let metrics = HeartbeatMetrics::new(
            risk_set,
            dirty_queue,
            plan_cache,
            attempt_ledger,
            price_math,
            price_stream,
        );
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.dirty_queue_size, 1);
        assert_eq!(snapshot.dirty_queue_total_marked, 1);
        assert_eq!(snapshot.risk_set_len, 0);
    }
}
