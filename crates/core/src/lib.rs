//! Core liquidation logic.
//!
//! This crate provides the core liquidation bot functionality:
//! - Health factor computation, batched and streamed
//! - Active risk set and dirty-queue admission
//! - Predictive and verifier loops driving liquidation decisions
//! - Liquidation planning and plan caching
//! - Price resolution (cache/stream/feed priority chain)
//! - Heartbeat metrics and attempt history

pub mod attempt_ledger;
pub mod config;
pub mod heartbeat_metrics;
pub mod hf_checker;
pub mod dirty_queue;
pub mod error;
pub mod plan_cache;
pub mod planner;
pub mod predictive;
pub mod price_math;
pub mod price_stream;
pub mod reserve_reader;
pub mod risk_set;
pub mod swap_quoter;
pub mod token_index;
pub mod u256_math;
pub mod verifier;

pub use attempt_ledger::{AttemptLedger, AttemptRecord, AttemptStatus};
pub use config::{BotConfig, EngineConfig, config, init_config};
pub use dirty_queue::DirtyQueue;
pub use error::BotError;
pub use heartbeat_metrics::HeartbeatMetrics;
pub use hf_checker::{AccountDataReader, HealthFactorChecker};
pub use plan_cache::PlanCache;
pub use planner::{LiquidationPlanner, Plan, ReserveReader, SwapQuoter};
pub use predictive::PredictiveLoop;
pub use price_math::PriceMath;
pub use price_stream::PriceStream;
pub use reserve_reader::{AssetReserveConfig, PoolAccountDataReader, ProtocolDataReader};
pub use risk_set::ActiveRiskSet;
pub use swap_quoter::AggregatorSwapQuoter;
pub use token_index::TokenUsersIndex;
pub use verifier::VerifierLoop;
