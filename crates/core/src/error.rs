//! Typed error kinds for the risk engine and execution path.
//!
//! Tick handlers (verifier, predictive loop, broadcaster) match on these
//! variants to decide logging level and which `AttemptStatus` to record.
//! Only config validation at startup escalates to `anyhow::Error`.

use alloy::primitives::Address;
use thiserror::Error;

use crate::attempt_ledger::AttemptStatus;

/// Typed error surface for the liquidation risk engine.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("rpc unreachable: {0}")]
    RpcUnreachable(String),

    #[error("rpc response could not be decoded: {0}")]
    RpcDecode(String),

    #[error("price stale for {asset} (age {age_secs}s)")]
    PriceStale { asset: Address, age_secs: u64 },

    #[error("price unavailable for {asset}")]
    PriceUnavailable { asset: Address },

    #[error("no collateral/debt pair for {user}")]
    NoPair { user: Address },

    #[error("safety check failed: {reason}")]
    SafetyCheckFailed { reason: String },

    #[error("aggregator unavailable: {0}")]
    AggregatorUnavailable(String),

    #[error("aggregator request timed out")]
    AggregatorTimeout,

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("transaction reverted: {0}")]
    TransactionReverted(String),

    #[error("attempt pending for {user}")]
    Pending { user: Address },
}

impl BotError {
    /// The `AttemptStatus` a verifier/planner/broadcaster should record for this error,
    /// or `None` when the error does not correspond to a recorded attempt (e.g. RPC-level
    /// errors that are retried transparently on the next tick).
    pub fn attempt_status(&self) -> Option<AttemptStatus> {
        match self {
            BotError::NoPair { .. } => Some(AttemptStatus::SkipNoPair),
            BotError::SafetyCheckFailed { .. } => Some(AttemptStatus::Error),
            BotError::AggregatorUnavailable(_) | BotError::AggregatorTimeout => {
                Some(AttemptStatus::Error)
            }
            BotError::BroadcastFailed(_) => Some(AttemptStatus::Failed),
            BotError::TransactionReverted(_) => Some(AttemptStatus::Reverted),
            BotError::Pending { .. } => Some(AttemptStatus::Pending),
            BotError::RpcUnreachable(_)
            | BotError::RpcDecode(_)
            | BotError::PriceStale { .. }
            | BotError::PriceUnavailable { .. }
            | BotError::ConfigInvalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_status_mapping() {
        let user = Address::ZERO;
        assert_eq!(
            BotError::NoPair { user }.attempt_status(),
            Some(AttemptStatus::SkipNoPair)
        );
        assert_eq!(
            BotError::Pending { user }.attempt_status(),
            Some(AttemptStatus::Pending)
        );
        assert_eq!(BotError::RpcUnreachable("timeout".into()).attempt_status(), None);
    }
}
