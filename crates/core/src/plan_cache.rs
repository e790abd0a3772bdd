//! TTL-bounded cache of pre-built liquidation plans.
//!
//! Grounded on `pre_staging.rs`'s `DashMap<Address, StagedLiquidation>` idiom: a plan
//! computed ahead of time by the Predictive Loop is kept warm so the Verifier Loop can
//! execute on the next tick without recomputing it. Unlike `pre_staging.rs`, there is no
//! price-deviation or position-hash invalidation here — staleness is TTL-only, and a
//! user's plan is dropped wholesale on expiry or explicit invalidation.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::Address;
use dashmap::DashMap;

use crate::planner::Plan;

/// Default plan lifetime before it is considered stale.
pub const DEFAULT_PLAN_TTL_MS: u64 = 15_000;
/// Default cache capacity.
pub const DEFAULT_PLAN_MAX_USERS: usize = 2000;

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanCacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub evicted: u64,
    pub expired: u64,
}

/// TTL-bounded, capacity-capped cache of precomputed plans, keyed by user.
pub struct PlanCache {
    plans: DashMap<Address, Plan>,
    ttl_ms: u64,
    max_users: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evicted: AtomicU64,
    expired: AtomicU64,
}

impl PlanCache {
    pub fn new(ttl_ms: u64, max_users: usize) -> Self {
        Self {
            plans: DashMap::new(),
            ttl_ms,
            max_users,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Stores `plan`, evicting the oldest entry by `created_at_ms` if at capacity.
    pub fn prepare(&self, plan: Plan) {
        let user = plan.user;
        if self.plans.len() >= self.max_users && !self.plans.contains_key(&user) {
            let oldest = self
                .plans
                .iter()
                .min_by_key(|e| e.created_at_ms)
                .map(|e| *e.key());
            if let Some(addr) = oldest {
                self.plans.remove(&addr);
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.plans.insert(user, plan);
    }

    /// Returns the cached plan if present and still within TTL. An expired entry is
    /// removed and counted as a miss, not returned.
    pub fn get(&self, user: &Address) -> Option<Plan> {
        let expired = match self.plans.get(user) {
            Some(entry) => now_ms().saturating_sub(entry.created_at_ms) > self.ttl_ms,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            self.plans.remove(user);
            self.expired.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        self.plans.get(user).map(|e| e.clone())
    }

    pub fn invalidate(&self, user: &Address) {
        self.plans.remove(user);
    }

    pub fn clear(&self) {
        self.plans.clear();
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn counters(&self) -> PlanCacheCounters {
        PlanCacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(DEFAULT_PLAN_TTL_MS, DEFAULT_PLAN_MAX_USERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, U256};

    fn plan_for(user: Address, created_at_ms: u64) -> Plan {
        Plan {
            user,
            debt_asset: Address::repeat_byte(0xD),
            collateral_asset: Address::repeat_byte(0xC),
            debt_to_cover: U256::from(1000u64),
            expected_collateral_out: U256::from(500u64),
            min_out: U256::from(1010u64),
            swap_calldata: Bytes::new(),
            debt_decimals: 6,
            collateral_decimals: 18,
            liquidation_bonus_bps: 500,
            profit_score: U256::ZERO,
            created_at_ms,
        }
    }

    #[test]
    fn get_within_ttl_hits_and_outside_ttl_misses() {
        let cache = PlanCache::new(1000, 10);
        let user = Address::repeat_byte(1);
        cache.prepare(plan_for(user, now_ms()));

        assert!(cache.get(&user).is_some());
        assert_eq!(cache.counters().hits, 1);

        cache.invalidate(&user);
        cache.prepare(plan_for(user, now_ms().saturating_sub(5000)));
        assert!(cache.get(&user).is_none());
        assert_eq!(cache.counters().expired, 1);
        assert!(cache.get(&user).is_none(), "expired entry must be deleted, not just skipped");
    }

    #[test]
    fn prepare_evicts_oldest_at_capacity() {
        let cache = PlanCache::new(60_000, 2);
        let a = Address::repeat_byte(0xA1);
        let b = Address::repeat_byte(0xB1);
        let c = Address::repeat_byte(0xC1);

        cache.prepare(plan_for(a, 100));
        cache.prepare(plan_for(b, 200));
        cache.prepare(plan_for(c, 300));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
        assert!(cache.get(&c).is_some());
        assert_eq!(cache.counters().evicted, 1);
    }

    #[test]
    fn missing_user_counts_as_miss() {
        let cache = PlanCache::new(1000, 10);
        assert!(cache.get(&Address::repeat_byte(9)).is_none());
        assert_eq!(cache.counters().misses, 1);
    }
}
