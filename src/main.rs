//! Liquidation bot entrypoint: wires every subsystem and runs until shutdown.
//!
//! Orchestration mirrors `scanner.rs::run`'s shape (spawn one task per subsystem, race
//! them against a shutdown signal with `tokio::select!`) but fans out to the flat
//! risk-set/dirty-queue/verifier pipeline instead of the teacher's tiered scan loops.

use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_api::{AggregatorClient, BlockAnaliticaClient};
use liquidator_chain::gas::{Eip1559GasStrategy, GasParams, GasStrategy};
use liquidator_chain::{
    encode_initiate_liquidation, BroadcasterConfig, Eip1559Fees, EventListener, OracleType as ChainOracleType,
    ProviderManager, TransactionBroadcaster,
};
use liquidator_core::attempt_ledger::{AttemptLedger, AttemptRecord, AttemptStatus};
use liquidator_core::config::AssetsConfig;
use liquidator_core::dirty_queue::DirtyQueue;
use liquidator_core::hf_checker::HealthFactorChecker;
use liquidator_core::plan_cache::PlanCache;
use liquidator_core::planner::{LiquidationPlanner, ReserveReader};
use liquidator_core::predictive::PredictiveLoop;
use liquidator_core::price_math::PriceMath;
use liquidator_core::price_stream::{FeedSubscription, PriceStream};
use liquidator_core::risk_set::{ActiveRiskSet, RiskSetConfig};
use liquidator_core::token_index::TokenUsersIndex;
use liquidator_core::verifier::{ExecutionCallback, VerifierConfig, VerifierLoop};
use liquidator_core::{
    config, AggregatorSwapQuoter, AssetReserveConfig, BotConfig, EngineConfig, HeartbeatMetrics,
    PoolAccountDataReader, ProtocolDataReader,
};

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

async fn fetch_fees(rpc_url: &str, strategy: &dyn GasStrategy) -> Result<Eip1559Fees> {
    let params = strategy.fetch_params(rpc_url).await?;
    Ok(match params {
        GasParams::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
            ..
        } => Eip1559Fees {
            max_priority_fee_per_gas,
            max_fee_per_gas,
        },
        GasParams::Legacy { gas_price } => Eip1559Fees {
            max_priority_fee_per_gas: gas_price,
            max_fee_per_gas: gas_price,
        },
    })
}

/// Wires the planner, broadcaster, and attempt ledger together as the Verifier/Predictive
/// loops' execution callback. Plan caching follows `pre_staging.rs`'s "compute ahead,
/// execute fast" shape: a cached plan from the predictive path is used verbatim, a miss
/// falls back to computing one inline.
struct Executor {
    planner: Arc<LiquidationPlanner>,
    plan_cache: Arc<PlanCache>,
    attempt_ledger: Arc<AttemptLedger>,
    broadcaster: Arc<TransactionBroadcaster>,
    gas_strategy: Arc<dyn GasStrategy>,
    rpc_url: String,
    executor_address: Address,
    execution_enabled: bool,
}

impl Executor {
    async fn plan_for(&self, user: Address) -> Option<liquidator_core::planner::Plan> {
        if let Some(plan) = self.plan_cache.get(&user) {
            return Some(plan);
        }
        match self.planner.plan(user).await {
            Ok(plan) => {
                self.plan_cache.prepare(plan.clone());
                Some(plan)
            }
            Err(e) => {
                if let Some(status) = e.attempt_status() {
                    self.attempt_ledger.record(AttemptRecord {
                        user,
                        timestamp_ms: now_ms(),
                        status,
                        tx_hash: None,
                        nonce: None,
                        error: Some(e.to_string()),
                    });
                }
                warn!(%user, error = %e, "execution: failed to produce a plan");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl ExecutionCallback for Executor {
    async fn execute(&self, user: Address) {
        let Some(plan) = self.plan_for(user).await else {
            return;
        };

        if !self.execution_enabled {
            info!(%user, profit_score = %plan.profit_score, "execution disabled, plan computed but not sent");
            return;
        }

        self.attempt_ledger.record(AttemptRecord {
            user,
            timestamp_ms: now_ms(),
            status: AttemptStatus::Pending,
            tx_hash: None,
            nonce: None,
            error: None,
        });

        let calldata = encode_initiate_liquidation(
            plan.user,
            plan.collateral_asset,
            plan.debt_asset,
            plan.debt_to_cover,
            plan.swap_calldata.clone(),
            plan.min_out,
            self.broadcaster.address(),
        );

        let fees = match fetch_fees(&self.rpc_url, self.gas_strategy.as_ref()).await {
            Ok(f) => f,
            Err(e) => {
                error!(%user, error = %e, "execution: failed to fetch gas params, skipping this tick");
                self.attempt_ledger.record(AttemptRecord {
                    user,
                    timestamp_ms: now_ms(),
                    status: AttemptStatus::Error,
                    tx_hash: None,
                    nonce: None,
                    error: Some(e.to_string()),
                });
                return;
            }
        };

        let outcome = self
            .broadcaster
            .send_with_replacement(self.executor_address, calldata, fees)
            .await;

        self.plan_cache.invalidate(&user);

        match outcome {
            liquidator_chain::BroadcastOutcome::Mined { hash, receipt } => {
                let status = if receipt.status() {
                    AttemptStatus::Included
                } else {
                    AttemptStatus::Reverted
                };
                info!(%user, %hash, ?status, "execution: transaction mined");
                self.attempt_ledger.record(AttemptRecord {
                    user,
                    timestamp_ms: now_ms(),
                    status,
                    tx_hash: Some(hash),
                    nonce: None,
                    error: None,
                });
            }
            liquidator_chain::BroadcastOutcome::Pending { hash } => {
                info!(%user, %hash, "execution: broadcast pending, no receipt within deadline");
                self.attempt_ledger.record(AttemptRecord {
                    user,
                    timestamp_ms: now_ms(),
                    status: AttemptStatus::Sent,
                    tx_hash: Some(hash),
                    nonce: None,
                    error: None,
                });
            }
            liquidator_chain::BroadcastOutcome::Failed { error: err, last_hash } => {
                warn!(%user, error = %err, "execution: broadcast failed");
                self.attempt_ledger.record(AttemptRecord {
                    user,
                    timestamp_ms: now_ms(),
                    status: AttemptStatus::Failed,
                    tx_hash: last_hash,
                    nonce: None,
                    error: Some(err),
                });
            }
        }
    }
}

/// Loads per-asset liquidation bonus/decimals from `ASSET_CONFIG_PATH`, if set. Assets
/// missing or inactive are skipped; the planner falls back to `default_liquidation_bonus_bps`
/// for anything not in the returned table.
fn load_asset_reserve_config(path: Option<&str>) -> Vec<(Address, AssetReserveConfig)> {
    let Some(path) = path else {
        warn!("ASSET_CONFIG_PATH not set; every asset will use the default liquidation bonus");
        return Vec::new();
    };

    let config = match AssetsConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(%path, error = %e, "failed to load asset config, falling back to default bonus for all assets");
            return Vec::new();
        }
    };

    config
        .active_assets()
        .filter_map(|asset| match asset.token_address() {
            Ok(address) => Some((
                address,
                AssetReserveConfig {
                    liquidation_bonus_bps: asset.liquidation_bonus_bps,
                    decimals: asset.decimals,
                },
            )),
            Err(e) => {
                warn!(symbol = %asset.symbol, error = %e, "skipping asset with invalid token address");
                None
            }
        })
        .collect()
}

/// Seeds the risk set from BlockAnalitica's at-risk wallet feed, via the streaming HF
/// check so a large candidate list never materializes into one giant `Vec` of results.
async fn seed_risk_set<R: liquidator_core::hf_checker::AccountDataReader>(
    hf_checker: &HealthFactorChecker<R>,
    risk_set: &ActiveRiskSet,
    token_index: &TokenUsersIndex,
    reserve_reader: &ProtocolDataReader,
    bot_config: &BotConfig,
) {
    let client = BlockAnaliticaClient::new();
    let wallets = match client
        .fetch_at_risk_wallets(bot_config.position.seed_hf_max, bot_config.position.seed_limit)
        .await
    {
        Ok(w) => w,
        Err(e) => {
            warn!(error = %e, "seeder: failed to fetch at-risk wallets, starting with an empty risk set");
            return;
        }
    };

    let addresses: Vec<Address> = wallets.iter().filter_map(|w| w.address()).collect();
    info!(count = addresses.len(), "seeder: fetched candidate addresses");

    hf_checker
        .check_stream(&addresses, liquidator_core::hf_checker::DEFAULT_SUB_BATCH_SIZE, |user, result| {
            match result {
                Ok(r) => risk_set.add_with_cap(user, r.health_factor, r.debt_usd, r.collateral_base),
                Err(e) => warn!(%user, error = %e, "seeder: initial health factor check failed"),
            }
        })
        .await;

    for candidate in risk_set.get_below_threshold() {
        if let Ok(reserves) = reserve_reader.read_reserves(candidate.address).await {
            let tokens: Vec<Address> = reserves
                .collaterals
                .iter()
                .chain(reserves.debts.iter())
                .map(|p| p.asset)
                .collect();
            token_index.set_user_tokens(candidate.address, &tokens);
        }
    }

    info!(risk_set_len = risk_set.len(), "seeder: admission complete");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,liquidator_core=debug,liquidator_chain=debug")),
        )
        .init();

    let engine_config = EngineConfig::from_env().context("loading engine configuration")?;
    let bot_config = config();

    info!(pool = %engine_config.pool_address, "starting liquidation bot");

    let provider = Arc::new(
        ProviderManager::new(
            &engine_config.rpc_url,
            &engine_config.rpc_url,
            &engine_config.rpc_url,
            &engine_config.ws_rpc_url,
            engine_config.pool_address,
            engine_config.data_provider,
        )
        .await
        .context("connecting provider")?,
    );
    let chain_id = provider.chain_id().await.context("fetching chain id")?;

    let price_math = Arc::new(PriceMath::new(None));

    let asset_reserve_config = load_asset_reserve_config(engine_config.asset_config_path.as_deref());
    let reserve_reader = Arc::new(ProtocolDataReader::new(
        provider.clone(),
        asset_reserve_config,
        engine_config.default_liquidation_bonus_bps,
    ));
    let account_data_reader = PoolAccountDataReader::new(provider.clone());

    let risk_set = Arc::new(ActiveRiskSet::new(RiskSetConfig {
        min_debt_usd: engine_config.min_debt_usd,
        hf_threshold_start: engine_config.hf_threshold_start,
        removal_hf_margin: liquidator_core::risk_set::DEFAULT_REMOVAL_HF_MARGIN,
        max_users: engine_config.riskset_max_users,
    }));
    let dirty_queue = Arc::new(DirtyQueue::new());
    let token_index = Arc::new(TokenUsersIndex::new());
    let attempt_ledger = Arc::new(AttemptLedger::new(liquidator_core::attempt_ledger::DEFAULT_RING_SIZE));
    let plan_cache = Arc::new(PlanCache::new(engine_config.plan_ttl_ms, engine_config.plan_max_users));

    let hf_checker = Arc::new(HealthFactorChecker::new(
        account_data_reader,
        price_math.clone(),
        engine_config.base_currency_decimals,
        engine_config.base_currency_is_usd,
        engine_config.eth_usd_asset,
    ));

    seed_risk_set(&hf_checker, &risk_set, &token_index, &reserve_reader, bot_config).await;

    let aggregator = AggregatorClient::new(engine_config.aggregator_url.clone())
        .with_timeout(std::time::Duration::from_secs(engine_config.aggregator_timeout_secs));
    let swap_quoter = Arc::new(AggregatorSwapQuoter::new(aggregator));

    let planner = Arc::new(
        LiquidationPlanner::new(reserve_reader.clone(), swap_quoter, price_math.clone(), engine_config.executor_address)
            .with_max_slippage_bps(engine_config.max_slippage_bps)
            .with_close_factor_bps(engine_config.close_factor_bps)
            .with_concurrency(engine_config.planner_concurrency),
    );

    let broadcaster = Arc::new(
        TransactionBroadcaster::new(
            &engine_config.execution_private_key,
            BroadcasterConfig {
                rpc_urls: vec![engine_config.rpc_url.clone()],
                replace_after_ms: engine_config.replace_after_ms,
                replace_max_attempts: engine_config.replace_max_attempts,
                fee_bump_pct: engine_config.fee_bump_pct,
                gas_limit: 2_000_000,
                chain_id,
            },
        )
        .await
        .context("initializing transaction broadcaster")?,
    );

    let gas_strategy: Arc<dyn GasStrategy> = Arc::new(Eip1559GasStrategy::new(2_000_000_000, 1.5));

    let executor_callback = Arc::new(Executor {
        planner: planner.clone(),
        plan_cache: plan_cache.clone(),
        attempt_ledger: attempt_ledger.clone(),
        broadcaster,
        gas_strategy,
        rpc_url: engine_config.rpc_url.clone(),
        executor_address: engine_config.executor_address,
        execution_enabled: engine_config.execution_enabled,
    });

    let verifier = Arc::new(VerifierLoop::new(
        VerifierConfig {
            tick_ms: engine_config.verifier_tick_ms,
            batch_size: engine_config.dirty_batch_size,
            sub_batch_size: liquidator_core::hf_checker::DEFAULT_SUB_BATCH_SIZE,
            hf_threshold_execute: engine_config.hf_threshold_execute,
            min_debt_usd: engine_config.min_debt_usd,
        },
        dirty_queue.clone(),
        risk_set.clone(),
        attempt_ledger.clone(),
        hf_checker.clone(),
        executor_callback,
    ));

    let predictive = Arc::new({
        let mut loop_ = PredictiveLoop::new(token_index.clone(), hf_checker.clone(), risk_set.clone(), planner.clone(), plan_cache.clone())
            .with_default_min_pct_move_bps(engine_config.pyth_min_pct_move_default_bps)
            .with_min_rescore_interval_ms(engine_config.predict_min_rescore_interval_ms);
        for (asset, bps) in &engine_config.pyth_min_pct_move_overrides {
            loop_ = loop_.with_threshold_bps(*asset, *bps);
        }
        loop_
    });

    let subscriptions: Vec<FeedSubscription> = engine_config
        .pyth_assets
        .iter()
        .map(|(asset, feed_id)| FeedSubscription { feed_id: *feed_id, asset: *asset })
        .collect();
    let price_stream = Arc::new(
        PriceStream::new(engine_config.pyth_ws_url.clone(), subscriptions, price_math.clone())
            .with_stale_secs(engine_config.pyth_stale_secs),
    );

    let heartbeat = Arc::new(
        HeartbeatMetrics::new(
            risk_set.clone(),
            dirty_queue.clone(),
            plan_cache.clone(),
            attempt_ledger.clone(),
            price_math.clone(),
            price_stream.clone(),
        )
        .with_interval(std::time::Duration::from_secs(engine_config.heartbeat_interval_secs)),
    );

    let event_listener = Arc::new(EventListener::new(
        engine_config.ws_rpc_url.clone(),
        engine_config.pool_address,
        Vec::<(Address, Address, ChainOracleType)>::new(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let verifier_task = {
        let verifier = verifier.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { verifier.run(shutdown_rx).await })
    };

    let heartbeat_task = {
        let heartbeat = heartbeat.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { heartbeat.run(shutdown_rx).await })
    };

    let price_stream_task = {
        let price_stream = price_stream.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { price_stream.run(shutdown_rx).await })
    };

    let predictive_task = {
        let predictive = predictive.clone();
        let mut ticks = price_stream.subscribe_ticks();
        let price_math = price_math.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    tick = ticks.recv() => {
                        match tick {
                            Ok((asset, price_tick)) => {
                                let price_1e18 = price_tick.price_1e18();
                                price_math.update_cached_price(asset, price_1e18);
                                predictive.on_price_tick(asset, price_tick, price_1e18).await;
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "predictive loop lagged behind price stream");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() { return; }
                    }
                }
            }
        })
    };

    let event_task = {
        let dirty_queue = dirty_queue.clone();
        let event_listener = event_listener.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut stream = match event_listener.subscribe_pool_events().await {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "event listener: failed to subscribe to pool events");
                    return;
                }
            };
            loop {
                tokio::select! {
                    event = futures::StreamExt::next(&mut stream) => {
                        match event {
                            Some(event) => dirty_queue.mark_dirty(event.user()),
                            None => return,
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() { return; }
                    }
                }
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(verifier_task, heartbeat_task, price_stream_task, predictive_task, event_task);

    Ok(())
}
