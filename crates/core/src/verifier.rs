//! The Verifier Loop: the single fixed-interval tick that turns dirty candidates into
//! execution decisions.
//!
//! Grounded on `scanner.rs`'s per-cycle `let mut ticker = interval(...); loop { ticker.tick()
//! .await; ... }` shape, applied once uniformly instead of across four tiers
//! (critical/hot/warm/cold). Each tick drains a bounded batch from the [`crate::dirty_queue`],
//! re-checks health factors, updates the [`crate::risk_set`], and fires an execution callback
//! for anyone crossing the execute threshold — gated by [`crate::attempt_ledger`] so a user
//! with a pending attempt is skipped, not re-queued.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tracing::{debug, info, warn};

use crate::attempt_ledger::AttemptLedger;
use crate::dirty_queue::DirtyQueue;
use crate::hf_checker::{AccountDataReader, HealthFactorChecker};
use crate::risk_set::ActiveRiskSet;

/// Default tick interval.
pub const DEFAULT_TICK_MS: u64 = 250;
/// Default batch size drained from the dirty queue each tick.
pub const DEFAULT_BATCH_SIZE: usize = 200;
/// Default execute threshold: HF at or below this triggers a liquidation attempt.
pub const DEFAULT_HF_THRESHOLD_EXECUTE: f64 = 1.0;
/// Default minimum debt (USD) required to execute.
pub const DEFAULT_MIN_DEBT_USD: f64 = 50.0;

#[derive(Debug, Clone, Copy)]
pub struct VerifierConfig {
    pub tick_ms: u64,
    pub batch_size: usize,
    pub sub_batch_size: usize,
    pub hf_threshold_execute: f64,
    pub min_debt_usd: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            sub_batch_size: crate::hf_checker::DEFAULT_SUB_BATCH_SIZE,
            hf_threshold_execute: DEFAULT_HF_THRESHOLD_EXECUTE,
            min_debt_usd: DEFAULT_MIN_DEBT_USD,
        }
    }
}

/// Invokes the execution path for a user deemed liquidatable this tick.
#[async_trait::async_trait]
pub trait ExecutionCallback: Send + Sync {
    async fn execute(&self, user: Address);
}

pub struct VerifierLoop<R: AccountDataReader> {
    config: VerifierConfig,
    dirty_queue: Arc<DirtyQueue>,
    risk_set: Arc<ActiveRiskSet>,
    attempt_ledger: Arc<AttemptLedger>,
    hf_checker: Arc<HealthFactorChecker<R>>,
    callback: Arc<dyn ExecutionCallback>,
}

impl<R: AccountDataReader> VerifierLoop<R> {
    pub fn new(
        config: VerifierConfig,
        dirty_queue: Arc<DirtyQueue>,
        risk_set: Arc<ActiveRiskSet>,
        attempt_ledger: Arc<AttemptLedger>,
        hf_checker: Arc<HealthFactorChecker<R>>,
        callback: Arc<dyn ExecutionCallback>,
    ) -> Self {
        Self {
            config,
            dirty_queue,
            risk_set,
            attempt_ledger,
            hf_checker,
            callback,
        }
    }

    /// One tick: drain, check, update, decide. Never propagates an error upward —
    /// per-user failures are logged and skipped.
    pub async fn tick(&self) {
        let batch = self.dirty_queue.take_batch(self.config.batch_size);
        if batch.is_empty() {
            return;
        }
        debug!(count = batch.len(), "verifier draining dirty batch");

        let results = self
            .hf_checker
            .check_batch(&batch, self.config.sub_batch_size)
            .await;

        for (user, result) in results {
            let hf_result = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!(%user, error = %e, "verifier: health factor check failed");
                    continue;
                }
            };

            self.risk_set.update_hf(
                user,
                hf_result.health_factor,
                hf_result.debt_usd,
                hf_result.collateral_base,
            );

            let should_execute = hf_result.health_factor <= self.config.hf_threshold_execute
                && hf_result.debt_usd >= self.config.min_debt_usd;

            if !should_execute {
                continue;
            }

            if self.attempt_ledger.has_pending(&user) {
                debug!(%user, "verifier: skipping, attempt already pending");
                continue;
            }

            self.callback.execute(user).await;
        }
    }

    /// Runs ticks on a fixed interval until `shutdown` fires.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.tick_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("verifier loop shutting down");
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
    use crate::hf_checker::RawAccountData;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedReader(RawAccountData);

    #[async_trait::async_trait]
    impl AccountDataReader for FixedReader {
        async fn get_user_account_data(&self, _user: Address) -> Result<RawAccountData, crate::error::BotError> {
            Ok(self.0)
        }
    }

    struct CountingCallback(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl ExecutionCallback for CountingCallback {
        async fn execute(&self, _user: Address) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn tick_fires_callback_for_liquidatable_user_below_threshold() {
        let dirty_queue = Arc::new(DirtyQueue::new());
        let user = Address::repeat_byte(1);
        dirty_queue.mark_dirty(user);

        let risk_set = Arc::new(ActiveRiskSet::default());
        let attempt_ledger = Arc::new(AttemptLedger::default());
        let price_math = Arc::new(crate::price_math::PriceMath::new(None));
        price_math.update_cached_price(Address::ZERO, crate::u256_math::WAD);

        let reader = FixedReader(RawAccountData {
            total_collateral_base: U256_for(120) * U256_for(100_000_000),
            total_debt_base: U256_for(100) * U256_for(100_000_000),
            current_liquidation_threshold_bps: 8000,
        });
        let hf_checker = Arc::new(HealthFactorChecker::new(reader, price_math, 8, true, Address::ZERO));

        let count = Arc::new(AtomicUsize::new(0));
        let callback = Arc::new(CountingCallback(count.clone()));

        let verifier = VerifierLoop::new(
            VerifierConfig::default(),
            dirty_queue,
            risk_set,
            attempt_ledger,
            hf_checker,
            callback,
        );
        verifier.tick().await;

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn tick_skips_user_with_pending_attempt() {
        let dirty_queue = Arc::new(DirtyQueue::new());
        let user = Address::repeat_byte(2);
        dirty_queue.mark_dirty(user);

        let risk_set = Arc::new(ActiveRiskSet::default());
        let attempt_ledger = Arc::new(AttemptLedger::default());
        attempt_ledger.record(crate::attempt_ledger::AttemptRecord {
            user,
            timestamp_ms: 0,
            status: crate::attempt_ledger::AttemptStatus::Pending,
            tx_hash: None,
            nonce: None,
            error: None,
        });
        let price_math = Arc::new(crate::price_math::PriceMath::new(None));

        let reader = FixedReader(RawAccountData {
            total_collateral_base: U256_for(120) * U256_for(100_000_000),
            total_debt_base: U256_for(100) * U256_for(100_000_000),
            current_liquidation_threshold_bps: 8000,
        });
        let hf_checker = Arc::new(HealthFactorChecker::new(reader, price_math, 8, true, Address::ZERO));

        let count = Arc::new(AtomicUsize::new(0));
        let callback = Arc::new(CountingCallback(count.clone()));

        let verifier = VerifierLoop::new(
            VerifierConfig::default(),
            dirty_queue,
            risk_set,
            attempt_ledger,
            hf_checker,
            callback,
        );
        verifier.tick().await;

        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[allow(non_snake_case)]
    fn U256_for(n: u64) -> alloy::primitives::U256 {
        alloy::primitives::U256::from(n)
    }
}
