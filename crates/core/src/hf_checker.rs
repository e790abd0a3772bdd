//! Health factor computation from raw account data, batched or streamed.
//!
//! Grounded on `scanner.rs::bootstrap`'s `get_positions_batch` fan-out (bounded
//! concurrency over many addresses) and `protocol/aave_v3.rs`'s health-factor formula,
//! generalized away from that file's `f64`-string USD conversion to the exact 1e18
//! integer math in [`crate::price_math`]. The streaming entry point exists because
//! seeding a risk set from ~100k candidates must not materialize a full `Vec` of results.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::BotError;
use crate::price_math::PriceMath;
use crate::u256_math::{self, WAD};

/// Default bounded concurrency for batched/streamed HF checks.
pub const DEFAULT_SUB_BATCH_SIZE: usize = 20;

/// Raw account data as returned by `getUserAccountData`.
#[derive(Debug, Clone, Copy)]
pub struct RawAccountData {
    pub total_collateral_base: U256,
    pub total_debt_base: U256,
    pub current_liquidation_threshold_bps: u16,
}

/// Reads account data for one user from the lending pool.
#[async_trait]
pub trait AccountDataReader: Send + Sync {
    async fn get_user_account_data(&self, user: Address) -> Result<RawAccountData, BotError>;
}

/// A computed health-factor result for one user.
#[derive(Debug, Clone, Copy)]
pub struct HfResult {
    pub user: Address,
    pub health_factor: f64,
    pub debt_usd: f64,
    pub collateral_base: u128,
}

/// Converts `totalDebtBase` into 1e18-scaled USD, honoring the base-currency convention.
pub fn debt_usd_1e18(total_debt_base: U256, base_decimals: u8, base_is_usd: bool, eth_usd_1e18: U256) -> U256 {
    let normalized = crate::price_math::normalize_to_e18(total_debt_base, base_decimals);
    if base_is_usd {
        normalized
    } else {
        u256_math::wad_mul(normalized, eth_usd_1e18)
    }
}

/// Computes HF from raw account data. `total_debt_base == 0` or a zero raw HF (the
/// protocol's own edge-case sentinel) both resolve to `f64::INFINITY`.
pub fn compute_health_factor(data: &RawAccountData) -> f64 {
    if data.total_debt_base.is_zero() {
        return f64::INFINITY;
    }
    let collateral = u256_math::wad_to_f64(crate::price_math::normalize_to_e18(data.total_collateral_base, 0));
    let debt = u256_math::wad_to_f64(crate::price_math::normalize_to_e18(data.total_debt_base, 0));
    if debt == 0.0 {
        return f64::INFINITY;
    }
    let lt = data.current_liquidation_threshold_bps as f64 / 10_000.0;
    let hf = (collateral * lt) / debt;
    if hf == 0.0 {
        f64::INFINITY
    } else {
        hf
    }
}

pub struct HealthFactorChecker<R: AccountDataReader> {
    reader: R,
    price_math: std::sync::Arc<PriceMath>,
    base_decimals: u8,
    base_is_usd: bool,
    eth_usd_asset: Address,
}

impl<R: AccountDataReader> HealthFactorChecker<R> {
    pub fn new(
        reader: R,
        price_math: std::sync::Arc<PriceMath>,
        base_decimals: u8,
        base_is_usd: bool,
        eth_usd_asset: Address,
    ) -> Self {
        Self {
            reader,
            price_math,
            base_decimals,
            base_is_usd,
            eth_usd_asset,
        }
    }

    async fn check_one(&self, user: Address) -> Result<HfResult, BotError> {
        let data = self.reader.get_user_account_data(user).await?;
        let eth_usd = if self.base_is_usd {
            WAD
        } else {
            self.price_math.get_usd_price(self.eth_usd_asset).await?
        };
        let debt_usd_wad = debt_usd_1e18(data.total_debt_base, self.base_decimals, self.base_is_usd, eth_usd);
        Ok(HfResult {
            user,
            health_factor: compute_health_factor(&data),
            debt_usd: u256_math::wad_to_f64(debt_usd_wad),
            collateral_base: data.total_collateral_base.to::<u128>(),
        })
    }

    /// Batched check over `users`, bounded by `sub_batch_size` concurrent reads.
    pub async fn check_batch(&self, users: &[Address], sub_batch_size: usize) -> Vec<(Address, Result<HfResult, BotError>)> {
        stream::iter(users.iter().copied())
            .map(|user| async move { (user, self.check_one(user).await) })
            .buffer_unordered(sub_batch_size.max(1))
            .collect()
            .await
    }

    /// Streaming variant for large seeding runs: invokes `on_result` per user instead of
    /// materializing a `Vec`, keeping memory bounded regardless of candidate count.
    pub async fn check_stream<F>(&self, users: &[Address], sub_batch_size: usize, mut on_result: F)
    where
        F: FnMut(Address, Result<HfResult, BotError>) + Send,
    {
        let mut results = stream::iter(users.iter().copied())
            .map(|user| async move { (user, self.check_one(user).await) })
            .buffer_unordered(sub_batch_size.max(1));

        while let Some((user, result)) = results.next().await {
            on_result(user, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_debt_yields_infinite_hf() {
        let data = RawAccountData {
            total_collateral_base: U256::from(1_000_000u64),
            total_debt_base: U256::ZERO,
            current_liquidation_threshold_bps: 8000,
        };
        assert_eq!(compute_health_factor(&data), f64::INFINITY);
    }

    #[test]
    fn normal_position_computes_expected_ratio() {
        let data = RawAccountData {
            total_collateral_base: U256::from(200_000_000u64),
            total_debt_base: U256::from(100_000_000u64),
            current_liquidation_threshold_bps: 8000,
        };
        // (200 * 0.8) / 100 = 1.6
        let hf = compute_health_factor(&data);
        assert!((hf - 1.6).abs() < 1e-9);
    }

    #[test]
    fn debt_usd_scales_by_eth_price_when_base_is_not_usd() {
        let total_debt_base = U256::from(1_000_000_000_000_000_000u128); // 1 ETH, base decimals 18
        let eth_usd = U256::from(2000u64) * WAD;
        let usd = debt_usd_1e18(total_debt_base, 18, false, eth_usd);
        assert_eq!(usd, U256::from(2000u64) * WAD);
    }
}
