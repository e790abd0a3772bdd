//! The Predictive Loop: fires on price-feed deltas between stream ticks, ahead of any
//! on-chain event, and pre-builds liquidation plans for users likely to become
//! liquidatable.
//!
//! Grounded on `scanner.rs::on_oracle_update`'s per-asset fan-out to
//! `users_affected_by_asset` and `pct_diff_bps` usage (`u256_math.rs`), but replaces its
//! `position.sensitivity.estimate_hf_from_prices` linear estimate with a real single-user
//! HF check — `sensitivity.rs`'s approximation model has no counterpart here. Per-user rate
//! limiting keeps a volatile asset from re-triggering the same user's HF check every tick.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::hf_checker::{AccountDataReader, HealthFactorChecker};
use crate::plan_cache::PlanCache;
use crate::planner::LiquidationPlanner;
use crate::price_stream::PriceTick;
use crate::risk_set::ActiveRiskSet;
use crate::token_index::TokenUsersIndex;

/// Default minimum bps move required to re-score a token's affected users.
pub const DEFAULT_MIN_PCT_MOVE_BPS: u32 = 50; // 0.5%
/// Default minimum interval between re-checks for the same user.
pub const DEFAULT_MIN_RESCORE_INTERVAL_MS: u64 = 5000;
/// HF at or below this triggers plan pre-build, ahead of the execute threshold.
pub const DEFAULT_PREPARE_THRESHOLD: f64 = 1.05;

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub struct PredictiveLoop<R: AccountDataReader> {
    last_price: DashMap<Address, alloy::primitives::U256>,
    last_checked: DashMap<Address, u64>,
    min_pct_move_bps: HashMap<Address, u32>,
    default_min_pct_move_bps: u32,
    min_rescore_interval_ms: u64,
    prepare_threshold: f64,
    token_index: Arc<TokenUsersIndex>,
    hf_checker: Arc<HealthFactorChecker<R>>,
    risk_set: Arc<ActiveRiskSet>,
    planner: Arc<LiquidationPlanner>,
    plan_cache: Arc<PlanCache>,
}

impl<R: AccountDataReader> PredictiveLoop<R> {
    pub fn new(
        token_index: Arc<TokenUsersIndex>,
        hf_checker: Arc<HealthFactorChecker<R>>,
        risk_set: Arc<ActiveRiskSet>,
        planner: Arc<LiquidationPlanner>,
        plan_cache: Arc<PlanCache>,
    ) -> Self {
        Self {
            last_price: DashMap::new(),
            last_checked: DashMap::new(),
            min_pct_move_bps: HashMap::new(),
            default_min_pct_move_bps: DEFAULT_MIN_PCT_MOVE_BPS,
            min_rescore_interval_ms: DEFAULT_MIN_RESCORE_INTERVAL_MS,
            prepare_threshold: DEFAULT_PREPARE_THRESHOLD,
            token_index,
            hf_checker,
            risk_set,
            planner,
            plan_cache,
        }
    }

    pub fn with_threshold_bps(mut self, asset: Address, bps: u32) -> Self {
        self.min_pct_move_bps.insert(asset, bps);
        self
    }

    pub fn with_default_min_pct_move_bps(mut self, bps: u32) -> Self {
        self.default_min_pct_move_bps = bps;
        self
    }

    pub fn with_min_rescore_interval_ms(mut self, ms: u64) -> Self {
        self.min_rescore_interval_ms = ms;
        self
    }

    fn threshold_for(&self, asset: &Address) -> u32 {
        self.min_pct_move_bps
            .get(asset)
            .copied()
            .unwrap_or(self.default_min_pct_move_bps)
    }

    fn rate_limited(&self, user: &Address) -> bool {
        match self.last_checked.get(user) {
            Some(ts) => now_ms().saturating_sub(*ts) < self.min_rescore_interval_ms,
            None => false,
        }
    }

    /// Handles one price tick: computes the move, finds affected users, re-checks HF
    /// for survivors of the rate limit, and pre-builds plans for anyone crossing the
    /// prepare threshold. The stored last price is only updated *after* the threshold
    /// check, so the move is always measured against the previously observed price.
    pub async fn on_price_tick(&self, asset: Address, _tick: PriceTick, new_price_1e18: alloy::primitives::U256) {
        let prev = self.last_price.get(&asset).map(|p| *p);

        let moved = match prev {
            None => {
                self.last_price.insert(asset, new_price_1e18);
                return;
            }
            Some(prev_price) => {
                if prev_price.is_zero() {
                    true
                } else {
                    let bps = crate::u256_math::pct_diff_bps(prev_price, new_price_1e18).unsigned_abs();
                    bps >= self.threshold_for(&asset) as u64
                }
            }
        };

        if !moved {
            self.last_price.insert(asset, new_price_1e18);
            return;
        }

        let affected = self.token_index.users_for_token(&asset);
        for user in affected {
            if self.rate_limited(&user) {
                debug!(%user, "predictive: rate limited, skipping rescore");
                continue;
            }
            self.last_checked.insert(user, now_ms());

            let result = self.hf_checker.check_batch(&[user], 1).await;
            let Some((_, hf_result)) = result.into_iter().next() else {
                continue;
            };
            let hf_result = match hf_result {
                Ok(r) => r,
                Err(e) => {
                    warn!(%user, error = %e, "predictive: hf check failed");
                    continue;
                }
            };

            self.risk_set.update_hf(
                user,
                hf_result.health_factor,
                hf_result.debt_usd,
                hf_result.collateral_base,
            );

            if hf_result.health_factor <= self.prepare_threshold {
                match self.planner.plan(user).await {
                    Ok(plan) => self.plan_cache.prepare(plan),
                    Err(e) => debug!(%user, error = %e, "predictive: plan pre-build failed"),
                }
            }
        }

        self.last_price.insert(asset, new_price_1e18);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::u256_math::WAD;

    /// S3 — predictive move: 0.6% crosses a 0.5% threshold, 0.4% does not.
    #[test]
    fn s3_pct_diff_bps_crosses_threshold() {
        let prev = WAD;
        let moved_up = prev + prev * alloy::primitives::U256::from(6u64) / alloy::primitives::U256::from(1000u64);
        let bps = crate::u256_math::pct_diff_bps(prev, moved_up);
        assert!(bps >= 50, "0.6% move ({bps}bps) should cross the 0.5% threshold");

        let moved_small = prev + prev * alloy::primitives::U256::from(4u64) / alloy::primitives::U256::from(1000u64);
        let bps_small = crate::u256_math::pct_diff_bps(prev, moved_small);
        assert!(bps_small < 50, "0.4% move ({bps_small}bps) should not cross the 0.5% threshold");
    }
}
