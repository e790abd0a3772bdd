//! Protocol Data Reader: turns `ProviderManager::get_position_data`'s raw
//! `BalanceData` rows into [`planner::UserReserves`].
//!
//! The oracle price embedded in `BalanceData` comes back 8-decimal scaled (the
//! `BalancesReader` helper contract's convention, same as `protocol::aave_v3`'s
//! `calculate_usd_value`); the planner wants everything 1e18-scaled, so prices are
//! rescaled once here rather than threading the 8-decimal convention further up.
//!
//! Per-asset liquidation bonus is not part of `BalanceData` — the `BalancesReader`
//! contract reports balances and prices, not reserve configuration — so it is
//! resolved from a small config table (address -> bonus bps), mirroring
//! `protocol::aave_v3::AaveV3Config::assets` with the same default-bonus fallback for
//! assets missing from the table.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use dashmap::DashMap;

use liquidator_chain::{BalanceData, ProviderManager};

use crate::error::BotError;
use crate::hf_checker::{AccountDataReader, RawAccountData};
use crate::planner::{ReservePosition, ReserveReader, UserReserves};

/// Per-asset liquidation bonus/decimals, keyed by underlying token.
#[derive(Debug, Clone, Copy)]
pub struct AssetReserveConfig {
    pub liquidation_bonus_bps: u16,
    pub decimals: u8,
}

/// Reads user reserves via a pool's `BalancesReader` contract.
///
/// Asset bonus config is supplied once at construction (it is deployment-time
/// data, not something to poll per liquidation check) and cached in a
/// [`DashMap`] for lock-free reads from the batch planner's concurrent tasks.
pub struct ProtocolDataReader {
    provider: Arc<ProviderManager>,
    asset_config: DashMap<Address, AssetReserveConfig>,
    default_liquidation_bonus_bps: u16,
}

impl ProtocolDataReader {
    pub fn new(
        provider: Arc<ProviderManager>,
        assets: impl IntoIterator<Item = (Address, AssetReserveConfig)>,
        default_liquidation_bonus_bps: u16,
    ) -> Self {
        let asset_config = DashMap::new();
        for (asset, cfg) in assets {
            asset_config.insert(asset, cfg);
        }
        Self {
            provider,
            asset_config,
            default_liquidation_bonus_bps,
        }
    }

    fn liquidation_bonus_bps(&self, asset: Address) -> u16 {
        self.asset_config
            .get(&asset)
            .map(|cfg| cfg.liquidation_bonus_bps)
            .unwrap_or(self.default_liquidation_bonus_bps)
    }

    /// `BalanceData::price` is 8-decimal scaled; the planner works in 1e18.
    fn price_1e18(raw_price_8dec: U256) -> U256 {
        raw_price_8dec * U256::from(10_000_000_000u64)
    }

    fn to_position(&self, entry: BalanceData, is_collateral: bool) -> ReservePosition {
        ReservePosition {
            asset: entry.underlying,
            balance: entry.amount,
            decimals: entry.decimals,
            price_1e18: Self::price_1e18(entry.price),
            liquidation_bonus_bps: self.liquidation_bonus_bps(entry.underlying),
            is_collateral,
        }
    }
}

#[async_trait]
impl ReserveReader for ProtocolDataReader {
    async fn read_reserves(&self, user: Address) -> Result<UserReserves, BotError> {
        let (supplied, borrowed) = self
            .provider
            .get_position_data(user)
            .await
            .map_err(|e| BotError::RpcDecode(e.to_string()))?;

        let collaterals = supplied
            .into_iter()
            .map(|entry| self.to_position(entry, true))
            .collect();
        let debts = borrowed
            .into_iter()
            .map(|entry| self.to_position(entry, false))
            .collect();

        Ok(UserReserves {
            user,
            collaterals,
            debts,
        })
    }
}

/// Wraps `ProviderManager::get_user_account_data` for the Health Factor Checker.
/// Separate from [`ProtocolDataReader`] because the HF checker only needs the pool's
/// aggregate view, not the per-asset `BalancesReader` breakdown the planner needs.
pub struct PoolAccountDataReader {
    provider: Arc<ProviderManager>,
}

impl PoolAccountDataReader {
    pub fn new(provider: Arc<ProviderManager>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AccountDataReader for PoolAccountDataReader {
    async fn get_user_account_data(&self, user: Address) -> Result<RawAccountData, BotError> {
        let data = self
            .provider
            .get_user_account_data(user)
            .await
            .map_err(|e| BotError::RpcDecode(e.to_string()))?;
        Ok(RawAccountData {
            total_collateral_base: data.total_collateral_base,
            total_debt_base: data.total_debt_base,
            current_liquidation_threshold_bps: data.current_liquidation_threshold_bps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_bonus_for_unknown_asset() {
        let asset_config: DashMap<Address, AssetReserveConfig> = DashMap::new();
        asset_config.insert(
            Address::repeat_byte(1),
            AssetReserveConfig {
                liquidation_bonus_bps: 750,
                decimals: 18,
            },
        );

        let known = asset_config
            .get(&Address::repeat_byte(1))
            .map(|c| c.liquidation_bonus_bps)
            .unwrap_or(500);
        let unknown = asset_config
            .get(&Address::repeat_byte(2))
            .map(|c| c.liquidation_bonus_bps)
            .unwrap_or(500);

        assert_eq!(known, 750);
        assert_eq!(unknown, 500);
    }

    #[test]
    fn rescales_eight_decimal_price_to_wad() {
        let price_8dec = U256::from(250_000_000_000u64); // $2500.00000000
        let price_1e18 = ProtocolDataReader::price_1e18(price_8dec);
        assert_eq!(price_1e18, U256::from(2500u64) * crate::u256_math::WAD);
    }
}
