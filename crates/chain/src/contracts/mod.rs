//! Contract bindings for lending protocols.
//!
//! This module provides type definitions and ABI constants for interacting
//! with various lending protocol smart contracts.
//!
//! # Protocol Support
//!
//! Protocol support is controlled via feature flags:
//! - `aave-v3` (default): AAVE V3 and forks (HyperLend, etc.)
//! - `aave-v4`: AAVE V4 (upcoming)
//! - `compound-v3`: Compound V3 (Comet)
//!
//! # Execution
//!
//! The [`executor`] module owns flash-loan/swap/liquidate orchestration on-chain; the bot
//! only ABI-encodes a single `initiateLiquidation` call with a pre-fetched aggregator quote.
//!
//! ```rust,ignore
//! use liquidator_chain::contracts::executor;
//!
//! let calldata = executor::encode_initiate_liquidation(
//!     user, collateral, debt, debt_to_cover, one_inch_calldata, min_out, payout,
//! );
//! ```

pub mod aave_v3;
pub mod common;
pub mod executor;

// Re-export commonly used types
pub use aave_v3::{wrap_swap_data, SwapAdapter, SwapAllocation};
pub use executor::{encode_initiate_liquidation, IExecutor, LiquidationParams};

use alloy::primitives::{Address, Bytes, B256, U256};

// Backward compatibility: re-export event_signatures module
pub mod event_signatures {
    pub use super::aave_v3::aave_v3_signatures::*;
    pub use super::common::common_signatures::ANSWER_UPDATED;

    use alloy::primitives::B256;

    /// Get all pool event signatures (for backward compatibility).
    pub fn pool_signatures() -> Vec<B256> {
        super::aave_v3::aave_v3_signatures::pool_signatures()
    }
}

/// Liquidator contract address plus its rescue-calldata encoding helpers.
///
/// Liquidation execution itself goes through [`executor::encode_initiate_liquidation`] and
/// the broadcaster, not through this wrapper — it only remains for the admin-facing
/// rescue-tokens path, which isn't on the bot's hot path.
pub struct LiquidatorContract {
    pub address: Address,
}

impl LiquidatorContract {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Encode rescue tokens calldata (rescues all tokens).
    pub fn encode_rescue_tokens(&self, token: Address, recipient: Address) -> Bytes {
        aave_v3::encode_rescue_tokens(token, recipient)
    }

    /// Encode rescue tokens calldata with specific amount.
    pub fn encode_rescue_tokens_amount(
        &self,
        token: Address,
        amount: U256,
        recipient: Address,
    ) -> Bytes {
        aave_v3::encode_rescue_tokens_amount(token, amount, recipient)
    }
}

/// Pool contract wrapper for event filtering.
pub struct PoolContract {
    pub address: Address,
}

impl PoolContract {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Get event signatures for subscription.
    pub fn event_signatures() -> Vec<B256> {
        event_signatures::pool_signatures()
    }
}

/// Oracle aggregator utilities.
pub struct OracleAggregator;

impl OracleAggregator {
    /// Get event signature for AnswerUpdated.
    pub fn answer_updated_signature() -> B256 {
        event_signatures::ANSWER_UPDATED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_signatures() {
        let sigs = PoolContract::event_signatures();
        assert_eq!(sigs.len(), 5);

        let answer_sig = OracleAggregator::answer_updated_signature();
        assert!(!answer_sig.is_zero());
    }
}
