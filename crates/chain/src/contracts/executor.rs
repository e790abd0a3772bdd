//! Executor contract interface.
//!
//! The teacher's `InstructionBuilder`/`InstructionType`/`FlashLoanProvider`/`ExecutionMode`
//! system let the bot compose arbitrary flash-loan/swap/liquidate/transfer sequences and
//! ABI-encode them into a single `execute(bytes)` call. This contract instead owns the
//! flash-loan mechanics itself and exposes exactly one entrypoint: the bot supplies the
//! user, the asset pair, how much debt to cover, and a pre-fetched swap calldata blob, and
//! the contract does the rest. The `sol!` macro binding idiom (one `interface` block, typed
//! struct args) is kept from `contracts/bindings.rs`; only the shape of the call changes.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolType;

sol! {
    /// Single-entrypoint executor: owns the flash loan, swap, and liquidation internally.
    interface IExecutor {
        function initiateLiquidation(LiquidationParams params) external returns (uint256 profit);
    }

    /// Arguments for `initiateLiquidation`.
    #[derive(Debug)]
    struct LiquidationParams {
        address user;
        address collateralAsset;
        address debtAsset;
        uint256 debtToCover;
        bytes oneInchCalldata;
        uint256 minOut;
        address payout;
    }
}

/// ABI-encodes a call to `initiateLiquidation` with the given parameters.
pub fn encode_initiate_liquidation(
    user: Address,
    collateral_asset: Address,
    debt_asset: Address,
    debt_to_cover: U256,
    one_inch_calldata: Bytes,
    min_out: U256,
    payout: Address,
) -> Bytes {
    let params = LiquidationParams {
        user,
        collateralAsset: collateral_asset,
        debtAsset: debt_asset,
        debtToCover: debt_to_cover,
        oneInchCalldata: one_inch_calldata,
        minOut: min_out,
        payout,
    };
    let call = IExecutor::initiateLiquidationCall { params };
    Bytes::from(call.abi_encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_nonempty_calldata() {
        let calldata = encode_initiate_liquidation(
            Address::ZERO,
            Address::ZERO,
            Address::ZERO,
            U256::from(1000u64),
            Bytes::new(),
            U256::from(900u64),
            Address::ZERO,
        );
        assert!(!calldata.is_empty());
    }
}
