//! Chain interaction layer.
//!
//! This crate provides:
//! - Provider management for HTTP and WebSocket connections
//! - Contract bindings for Pool, BalancesReader, Oracle, Liquidator
//! - Event listeners for real-time oracle and pool events
//! - Oracle price monitoring and caching
//! - DualOracle tier tracking for LST assets
//! - Gas strategy and multi-RPC transaction broadcasting

pub mod broadcaster;
mod contracts;
mod dual_oracle;
mod event_listener;
pub mod gas;
mod oracle_monitor;
mod provider;
mod signer;

pub use broadcaster::{BroadcastOutcome, BroadcasterConfig, Eip1559Fees, TransactionBroadcaster};
pub use contracts::{
    encode_initiate_liquidation, event_signatures, LiquidatorContract, OracleAggregator,
    PoolContract, SwapAllocation,
};
pub use dual_oracle::{DualOracleMonitor, DualOracleTier, TierTransition};
pub use event_listener::{EventListener, OracleType, OracleUpdate, PoolEvent};
pub use oracle_monitor::{OracleMonitor, OraclePrice};
pub use provider::{BalanceData, ProviderManager, RawAccountData};
pub use signer::NonceManager;
