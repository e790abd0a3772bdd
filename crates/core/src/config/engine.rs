//! Environment-sourced configuration for the risk engine proper.
//!
//! `bot.rs`'s [`super::BotConfig`] covers tunable profile knobs (dust thresholds, tier
//! HFs, scanner cadence) loaded from `BOT_PROFILE` with TOML-serializable defaults. The
//! engine also needs hard requirements with no sensible default — an RPC URL, a pool
//! address, a signer key — which must be present and well-formed at startup or the bot
//! should refuse to run. `EngineConfig::from_env` follows the same "read env, validate,
//! fail loud" shape as `loader.rs::DeploymentLoader::resolve_contracts`'s address parsing,
//! but flattened into one struct instead of a registry of TOML files.

use std::collections::HashMap;

use alloy::primitives::Address;

use crate::error::BotError;

/// Fully resolved runtime configuration for the risk engine, execution, and transport
/// layers. Validated once at startup; a [`BotError::ConfigInvalid`] here is fatal.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rpc_url: String,
    pub ws_rpc_url: String,
    pub subgraph_url: Option<String>,
    pub graph_api_key: Option<String>,

    pub pool_address: Address,
    pub data_provider: Address,
    pub base_currency_decimals: u8,
    pub base_currency_is_usd: bool,
    /// Required when `base_currency_is_usd` is false: the asset whose USD price converts
    /// the pool's native-denominated `totalDebtBase`/`totalCollateralBase` into USD.
    pub eth_usd_asset: Address,

    pub min_debt_usd: f64,
    pub hf_threshold_start: f64,
    pub hf_threshold_execute: f64,

    pub executor_address: Address,
    pub execution_private_key: String,
    pub execution_enabled: bool,

    pub pyth_ws_url: String,
    pub pyth_assets: Vec<(Address, [u8; 32])>,
    pub pyth_stale_secs: u64,
    pub pyth_min_pct_move_default_bps: u32,
    pub pyth_min_pct_move_overrides: HashMap<Address, u32>,

    pub predict_min_rescore_interval_ms: u64,
    pub riskset_max_users: usize,
    pub plan_ttl_ms: u64,
    pub plan_max_users: usize,
    pub replace_after_ms: u64,
    pub replace_max_attempts: u32,
    pub fee_bump_pct: u64,

    pub heartbeat_interval_secs: u64,
    pub verifier_tick_ms: u64,
    pub dirty_batch_size: usize,
    pub planner_concurrency: usize,
    pub aggregator_url: String,
    pub aggregator_timeout_secs: u64,
    pub max_slippage_bps: u16,
    pub close_factor_bps: u16,

    /// Path to a TOML file of per-asset liquidation bonus/decimals (see
    /// [`super::AssetsConfig`]). Without it, every asset falls back to
    /// `default_liquidation_bonus_bps`.
    pub asset_config_path: Option<String>,
    pub default_liquidation_bonus_bps: u16,
}

fn require_env(key: &str) -> Result<String, BotError> {
    std::env::var(key).map_err(|_| BotError::ConfigInvalid(format!("missing required env var {key}")))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, BotError> {
    match optional_env(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| BotError::ConfigInvalid(format!("{key}={raw} is not valid"))),
        None => Ok(default),
    }
}

fn parse_address(key: &str, raw: &str) -> Result<Address, BotError> {
    raw.parse()
        .map_err(|_| BotError::ConfigInvalid(format!("{key}={raw} is not a 20-byte address")))
}

fn parse_feed_id(raw: &str) -> Result<[u8; 32], BotError> {
    let trimmed = raw.trim_start_matches("0x");
    let bytes = hex::decode(trimmed)
        .map_err(|_| BotError::ConfigInvalid(format!("PYTH_ASSETS feed id {raw} is not hex")))?;
    bytes
        .try_into()
        .map_err(|_| BotError::ConfigInvalid(format!("PYTH_ASSETS feed id {raw} must be 32 bytes")))
}

/// Parses `asset_addr:feed_id,asset_addr:feed_id,...`.
fn parse_pyth_assets(raw: &str) -> Result<Vec<(Address, [u8; 32])>, BotError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (addr, feed) = pair
                .split_once(':')
                .ok_or_else(|| BotError::ConfigInvalid(format!("PYTH_ASSETS entry {pair} missing ':'")))?;
            Ok((parse_address("PYTH_ASSETS", addr)?, parse_feed_id(feed)?))
        })
        .collect()
}

/// Parses a JSON object `{"0xabc...": 75, ...}` of per-asset minimum move overrides.
fn parse_pct_move_overrides(raw: &str) -> Result<HashMap<Address, u32>, BotError> {
    let parsed: HashMap<String, u32> = serde_json::from_str(raw)
        .map_err(|e| BotError::ConfigInvalid(format!("PYTH_MIN_PCT_MOVE_JSON invalid: {e}")))?;
    parsed
        .into_iter()
        .map(|(addr, bps)| Ok((parse_address("PYTH_MIN_PCT_MOVE_JSON", &addr)?, bps)))
        .collect()
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, BotError> {
        let base_currency_decimals = parse_env("BASE_CURRENCY_DECIMALS", 8u8)?;
        if base_currency_decimals > 18 {
            return Err(BotError::ConfigInvalid(
                "BASE_CURRENCY_DECIMALS must be between 0 and 18".into(),
            ));
        }

        let hf_threshold_start: f64 = parse_env("HF_THRESHOLD_START", 1.05)?;
        if hf_threshold_start < 1.0 {
            return Err(BotError::ConfigInvalid("HF_THRESHOLD_START must be >= 1.0".into()));
        }
        let hf_threshold_execute: f64 = parse_env("HF_THRESHOLD_EXECUTE", 1.0)?;
        if !(0.9..=1.0).contains(&hf_threshold_execute) {
            return Err(BotError::ConfigInvalid(
                "HF_THRESHOLD_EXECUTE must be between 0.9 and 1.0".into(),
            ));
        }

        let riskset_max_users: usize = parse_env("RISKSET_MAX_USERS", 5000)?;
        if riskset_max_users < 500 {
            return Err(BotError::ConfigInvalid("RISKSET_MAX_USERS must be >= 500".into()));
        }

        let pyth_assets_raw = require_env("PYTH_ASSETS")?;

        Ok(Self {
            rpc_url: require_env("RPC_URL")?,
            ws_rpc_url: require_env("WS_RPC_URL")?,
            subgraph_url: optional_env("SUBGRAPH_URL"),
            graph_api_key: optional_env("GRAPH_API_KEY"),

            pool_address: parse_address("POOL_ADDRESS", &require_env("POOL_ADDRESS")?)?,
            data_provider: parse_address("DATA_PROVIDER", &require_env("DATA_PROVIDER")?)?,
            base_currency_decimals,
            base_currency_is_usd: parse_env("BASE_CURRENCY_IS_USD", false)?,
            eth_usd_asset: match optional_env("ETH_USD_ASSET") {
                Some(raw) => parse_address("ETH_USD_ASSET", &raw)?,
                None => Address::ZERO,
            },

            min_debt_usd: parse_env("MIN_DEBT_USD", 50.0)?,
            hf_threshold_start,
            hf_threshold_execute,

            executor_address: parse_address("EXECUTOR_ADDRESS", &require_env("EXECUTOR_ADDRESS")?)?,
            execution_private_key: require_env("EXECUTION_PRIVATE_KEY")?,
            execution_enabled: parse_env("EXECUTION_ENABLED", false)?,

            pyth_ws_url: require_env("PYTH_WS_URL")?,
            pyth_assets: parse_pyth_assets(&pyth_assets_raw)?,
            pyth_stale_secs: parse_env("PYTH_STALE_SECS", 60)?,
            pyth_min_pct_move_default_bps: parse_env("PYTH_MIN_PCT_MOVE_DEFAULT", 50)?,
            pyth_min_pct_move_overrides: match optional_env("PYTH_MIN_PCT_MOVE_JSON") {
                Some(raw) => parse_pct_move_overrides(&raw)?,
                None => HashMap::new(),
            },

            predict_min_rescore_interval_ms: parse_env("PREDICT_MIN_RESCORE_INTERVAL_MS", 5000)?,
            riskset_max_users,
            plan_ttl_ms: parse_env("PLAN_TTL_MS", 15_000)?,
            plan_max_users: parse_env("PLAN_MAX_USERS", 2000)?,
            replace_after_ms: parse_env("REPLACE_AFTER_MS", 3000)?,
            replace_max_attempts: parse_env("REPLACE_MAX_ATTEMPTS", 3)?,
            fee_bump_pct: parse_env("FEE_BUMP_PCT", 20)?,

            heartbeat_interval_secs: parse_env("HEARTBEAT_INTERVAL_SECS", 30)?,
            verifier_tick_ms: parse_env("VERIFIER_TICK_MS", 250)?,
            dirty_batch_size: parse_env("DIRTY_BATCH_SIZE", 200)?,
            planner_concurrency: parse_env("PLANNER_CONCURRENCY", 10)?,
            aggregator_url: require_env("AGGREGATOR_URL")?,
            aggregator_timeout_secs: parse_env("AGGREGATOR_TIMEOUT_SECS", 5)?,
            max_slippage_bps: parse_env("MAX_SLIPPAGE_BPS", 500)?,
            close_factor_bps: parse_env("CLOSE_FACTOR_BPS", 5000)?,

            asset_config_path: optional_env("ASSET_CONFIG_PATH"),
            default_liquidation_bonus_bps: parse_env("DEFAULT_LIQUIDATION_BONUS_BPS", 500)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_csv_pyth_assets() {
        let raw = "0x0000000000000000000000000000000000000001:aa11,0x0000000000000000000000000000000000000002:bb22";
        let raw = raw.replace("aa11", &"aa".repeat(32)).replace("bb22", &"bb".repeat(32));
        let parsed = parse_pyth_assets(&raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].1, [0xaa; 32]);
        assert_eq!(parsed[1].1, [0xbb; 32]);
    }

    #[test]
    fn rejects_malformed_feed_id() {
        assert!(parse_pyth_assets("0x0000000000000000000000000000000000000001:zz").is_err());
    }

    #[test]
    fn parses_pct_move_overrides_json() {
        let raw = r#"{"0x0000000000000000000000000000000000000001": 75}"#;
        let parsed = parse_pct_move_overrides(raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(*parsed.values().next().unwrap(), 75);
    }
}
