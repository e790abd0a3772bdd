//! Liquidation plan computation: exact debt/collateral sizing, bonus application,
//! aggregator safety gate, and an oracle-based profit score.
//!
//! Replaces the teacher's `liquidator.rs::calculate_collateral_amount` (a debt-halving
//! shortcut) and `estimate_profit` (a bonus-registry/gas/slippage model) with the exact
//! multi-step formula below. What survives from the teacher: the largest-collateral /
//! largest-debt selection idiom (`TrackedPosition::largest_collateral`/`largest_debt` in
//! `position.rs`) and the `buffer_unordered`-style bounded-concurrency read pattern used
//! elsewhere in the crate for per-reserve reads.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::BotError;
use crate::price_math::{self, PriceMath};
use crate::u256_math::BPS_DENOMINATOR;

/// Fixed close factor: 50% of total debt, per the resolved Open Question (no
/// emergency-mode override).
pub const CLOSE_FACTOR_BPS: u16 = 5000;
/// Flash-loan fee assumption used for the safety floor (0.09%).
pub const FLASHLOAN_FEE_BPS: u16 = 9;
/// Safety buffer above the flash-loan fee (0.5%).
pub const SAFETY_BUFFER_BPS: u16 = 50;
/// Default slippage ceiling for the aggregator's quoted minOut.
pub const DEFAULT_MAX_SLIPPAGE_BPS: u16 = 500;
/// Default per-reserve read concurrency.
pub const DEFAULT_PLANNER_CONCURRENCY: usize = 10;

/// One of a user's reserve positions, already priced.
#[derive(Debug, Clone, Copy)]
pub struct ReservePosition {
    pub asset: Address,
    pub balance: U256,
    pub decimals: u8,
    pub price_1e18: U256,
    pub liquidation_bonus_bps: u16,
    pub is_collateral: bool,
}

/// Everything the planner needs about a user's reserves to pick a pair.
#[derive(Debug, Clone)]
pub struct UserReserves {
    pub user: Address,
    pub collaterals: Vec<ReservePosition>,
    pub debts: Vec<ReservePosition>,
}

/// Reads per-user reserve data; implemented by the chain crate's protocol reader.
#[async_trait]
pub trait ReserveReader: Send + Sync {
    async fn read_reserves(&self, user: Address) -> Result<UserReserves, BotError>;
}

/// Requests swap calldata from the external aggregator.
#[async_trait]
pub trait SwapQuoter: Send + Sync {
    async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        slippage_bps: u16,
        recipient: Address,
    ) -> Result<SwapQuote, BotError>;
}

/// The aggregator's quoted swap.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub to: Address,
    pub calldata: Bytes,
    pub min_out: U256,
}

/// A fully-specified, executable liquidation plan.
#[derive(Debug, Clone)]
pub struct Plan {
    pub user: Address,
    pub debt_asset: Address,
    pub collateral_asset: Address,
    pub debt_to_cover: U256,
    pub expected_collateral_out: U256,
    pub min_out: U256,
    pub swap_calldata: Bytes,
    pub debt_decimals: u8,
    pub collateral_decimals: u8,
    pub liquidation_bonus_bps: u16,
    /// 1e18-scaled USD profit estimate.
    pub profit_score: U256,
    pub created_at_ms: u64,
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The floor `minRequiredOut` every plan must clear.
pub fn min_required_out(debt_to_cover: U256) -> U256 {
    let flashloan_fee = debt_to_cover * U256::from(FLASHLOAN_FEE_BPS) / BPS_DENOMINATOR;
    let safety_buffer = debt_to_cover * U256::from(SAFETY_BUFFER_BPS) / BPS_DENOMINATOR;
    debt_to_cover + flashloan_fee + safety_buffer
}

/// The Liquidation Planner. Owns no state beyond its collaborators.
pub struct LiquidationPlanner {
    reserve_reader: Arc<dyn ReserveReader>,
    swap_quoter: Arc<dyn SwapQuoter>,
    price_math: Arc<PriceMath>,
    executor: Address,
    max_slippage_bps: u16,
    close_factor_bps: u16,
    concurrency: usize,
}

impl LiquidationPlanner {
    pub fn new(
        reserve_reader: Arc<dyn ReserveReader>,
        swap_quoter: Arc<dyn SwapQuoter>,
        price_math: Arc<PriceMath>,
        executor: Address,
    ) -> Self {
        Self {
            reserve_reader,
            swap_quoter,
            price_math,
            executor,
            max_slippage_bps: DEFAULT_MAX_SLIPPAGE_BPS,
            close_factor_bps: CLOSE_FACTOR_BPS,
            concurrency: DEFAULT_PLANNER_CONCURRENCY,
        }
    }

    pub fn with_max_slippage_bps(mut self, bps: u16) -> Self {
        self.max_slippage_bps = bps;
        self
    }

    pub fn with_close_factor_bps(mut self, bps: u16) -> Self {
        self.close_factor_bps = bps;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    fn pick_largest(positions: &[ReservePosition]) -> Option<&ReservePosition> {
        positions.iter().max_by(|a, b| {
            let usd_a = PriceMath::calculate_usd_value(a.balance, a.decimals, a.price_1e18);
            let usd_b = PriceMath::calculate_usd_value(b.balance, b.decimals, b.price_1e18);
            usd_a.partial_cmp(&usd_b).unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    #[tracing::instrument(skip(self), fields(user = %user))]
    pub async fn plan(&self, user: Address) -> Result<Plan, BotError> {
        let reserves = self.reserve_reader.read_reserves(user).await?;

        let collateral = Self::pick_largest(&reserves.collaterals)
            .copied()
            .ok_or(BotError::NoPair { user })?;
        let debt = Self::pick_largest(&reserves.debts)
            .copied()
            .ok_or(BotError::NoPair { user })?;

        let debt_to_cover = debt.balance * U256::from(self.close_factor_bps) / BPS_DENOMINATOR;

        let debt_to_cover_1e18 = price_math::normalize_to_e18(debt_to_cover, debt.decimals);
        let debt_value_usd_1e18 = crate::u256_math::wad_mul(debt_to_cover_1e18, debt.price_1e18);
        let mut collateral_1e18 = crate::u256_math::wad_div(debt_value_usd_1e18, collateral.price_1e18);
        collateral_1e18 = collateral_1e18 * U256::from(10000u16 + collateral.liquidation_bonus_bps)
            / BPS_DENOMINATOR;

        let expected_collateral_out = price_math::denormalize_from_e18(collateral_1e18, collateral.decimals);

        let min_required = min_required_out(debt_to_cover);

        let quote = self
            .swap_quoter
            .quote(
                collateral.asset,
                debt.asset,
                expected_collateral_out,
                self.max_slippage_bps,
                self.executor,
            )
            .await?;

        if quote.min_out <= min_required {
            return Err(BotError::SafetyCheckFailed {
                reason: format!("minOut {} must be > debtToCover+fees {}", quote.min_out, min_required),
            });
        }

        if !expected_collateral_out.is_zero() {
            let slippage_bps =
                ((expected_collateral_out - quote.min_out.min(expected_collateral_out)) * BPS_DENOMINATOR)
                    / expected_collateral_out;
            if slippage_bps > U256::from(self.max_slippage_bps) {
                return Err(BotError::SafetyCheckFailed {
                    reason: format!("slippage {}bps exceeds max {}bps", slippage_bps, self.max_slippage_bps),
                });
            }
        }

        let profit_1e18 = price_math::normalize_to_e18(quote.min_out - min_required, debt.decimals);
        let profit_score = crate::u256_math::wad_mul(profit_1e18, debt.price_1e18);

        Ok(Plan {
            user,
            debt_asset: debt.asset,
            collateral_asset: collateral.asset,
            debt_to_cover,
            expected_collateral_out,
            min_out: quote.min_out,
            swap_calldata: quote.calldata,
            debt_decimals: debt.decimals,
            collateral_decimals: collateral.decimals,
            liquidation_bonus_bps: collateral.liquidation_bonus_bps,
            profit_score,
            created_at_ms: now_ms(),
        })
    }

    /// Plans for many users concurrently, bounded by `self.concurrency`.
    pub async fn plan_batch(&self, users: &[Address]) -> Vec<(Address, Result<Plan, BotError>)> {
        stream::iter(users.iter().copied())
            .map(|user| async move { (user, self.plan(user).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S4 — plan math.
    #[test]
    fn s4_plan_math_matches_worked_example() {
        let debt_balance = U256::from(2000_000_000u64); // 2000e6
        let debt_to_cover = debt_balance * U256::from(CLOSE_FACTOR_BPS) / BPS_DENOMINATOR;
        assert_eq!(debt_to_cover, U256::from(1000_000_000u64)); // 1000e6

        let debt_price_1e18 = U256::from(1u64) * crate::u256_math::WAD;
        let collateral_price_1e18 = U256::from(2000u64) * crate::u256_math::WAD;

        let debt_to_cover_1e18 = price_math::normalize_to_e18(debt_to_cover, 6);
        assert_eq!(debt_to_cover_1e18, U256::from(1000u64) * crate::u256_math::WAD);

        let debt_value_usd_1e18 = crate::u256_math::wad_mul(debt_to_cover_1e18, debt_price_1e18);
        let collateral_1e18 = crate::u256_math::wad_div(debt_value_usd_1e18, collateral_price_1e18);
        assert_eq!(collateral_1e18, U256::from(5u64) * crate::u256_math::WAD / U256::from(10u64));

        let with_bonus = collateral_1e18 * U256::from(10500u64) / BPS_DENOMINATOR;
        assert_eq!(
            with_bonus,
            U256::from(525u64) * crate::u256_math::WAD / U256::from(1000u64)
        );

        let min_required = min_required_out(debt_to_cover);
        assert_eq!(min_required, U256::from(1_005_900_000u64));
    }

    /// S6 — safety rejection when minOut == debtToCover.
    #[test]
    fn s6_min_required_floor_invariant() {
        let debt_to_cover = U256::from(1_000_000u64);
        let min_required = min_required_out(debt_to_cover);
        assert!(min_required > debt_to_cover);
        // minOut == debtToCover must fail the `> minRequired` gate.
        assert!(debt_to_cover <= min_required);
    }
}
