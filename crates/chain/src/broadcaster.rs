//! Multi-RPC transaction broadcaster with fee-bump replacement.
//!
//! Reuses `signer.rs`'s [`crate::signer::NonceManager`] verbatim — nonce caching needs no
//! change. `signer.rs`'s `TransactionSender` is generalized here from "submit to one RPC,
//! await its receipt" into "sign once per attempt, broadcast to every configured RPC
//! concurrently via `futures::future::join_all`, and poll only the first RPC for a
//! receipt" (the resolved Open Question on receipt polling). The retry/backoff timing
//! idiom (`Instant`-based elapsed logging) is carried over from `liquidator.rs`'s
//! `execute_with_retry`/`execute_staged`, adapted into the fixed replacement-delay loop
//! below. Fee bumping multiplies both EIP-1559 fee fields by the configured bump percent
//! and reshapes a new transaction with the same nonce.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use futures::future::join_all;
use tracing::{info, warn};

use crate::signer::NonceManager;

/// Default delay before bumping fees and re-broadcasting.
pub const DEFAULT_REPLACE_AFTER_MS: u64 = 3000;
/// Default maximum number of fee-bump replacement attempts.
pub const DEFAULT_REPLACE_MAX_ATTEMPTS: u32 = 3;
/// Default percentage fee bump per replacement round.
pub const DEFAULT_FEE_BUMP_PCT: u64 = 20;
/// Receipt poll interval on the primary RPC.
pub const RECEIPT_POLL_MS: u64 = 500;

/// Outcome of a broadcast-and-replace cycle.
#[derive(Debug, Clone)]
pub enum BroadcastOutcome {
    Mined { hash: B256, receipt: TransactionReceipt },
    Failed { error: String, last_hash: Option<B256> },
    Pending { hash: B256 },
}

#[derive(Debug, Clone, Copy)]
pub struct Eip1559Fees {
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
}

impl Eip1559Fees {
    fn bumped(&self, pct: u64) -> Self {
        Self {
            max_priority_fee_per_gas: self.max_priority_fee_per_gas * (100 + pct) as u128 / 100,
            max_fee_per_gas: self.max_fee_per_gas * (100 + pct) as u128 / 100,
        }
    }
}

pub struct BroadcasterConfig {
    pub rpc_urls: Vec<String>,
    pub replace_after_ms: u64,
    pub replace_max_attempts: u32,
    pub fee_bump_pct: u64,
    pub gas_limit: u64,
    pub chain_id: u64,
}

impl BroadcasterConfig {
    pub fn new(rpc_urls: Vec<String>, chain_id: u64, gas_limit: u64) -> Self {
        Self {
            rpc_urls,
            replace_after_ms: DEFAULT_REPLACE_AFTER_MS,
            replace_max_attempts: DEFAULT_REPLACE_MAX_ATTEMPTS,
            fee_bump_pct: DEFAULT_FEE_BUMP_PCT,
            gas_limit,
            chain_id,
        }
    }
}

/// Signs once per attempt and races a transaction across every configured RPC,
/// bumping fees and resubmitting under the same nonce if no receipt lands in time.
pub struct TransactionBroadcaster {
    wallet: EthereumWallet,
    address: Address,
    nonce_manager: NonceManager,
    config: BroadcasterConfig,
    replacements_sent: AtomicU64,
}

impl TransactionBroadcaster {
    pub async fn new(private_key: &str, config: BroadcasterConfig) -> anyhow::Result<Self> {
        let key_str = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse()?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let primary = config
            .rpc_urls
            .first()
            .ok_or_else(|| anyhow::anyhow!("broadcaster requires at least one RPC url"))?;
        let provider = ProviderBuilder::new().on_http(primary.parse()?);
        let initial_nonce = provider.get_transaction_count(address).await?;

        Ok(Self {
            wallet,
            address,
            nonce_manager: NonceManager::new(initial_nonce),
            config,
            replacements_sent: AtomicU64::new(0),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn replacements_sent(&self) -> u64 {
        self.replacements_sent.load(Ordering::Relaxed)
    }

    fn build_tx(&self, to: Address, calldata: &Bytes, value: U256, nonce: u64, fees: Eip1559Fees) -> TransactionRequest {
        TransactionRequest::default()
            .with_to(to)
            .with_input(calldata.clone())
            .with_value(value)
            .with_nonce(nonce)
            .with_gas_limit(self.config.gas_limit)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
            .with_chain_id(self.config.chain_id)
    }

    /// Broadcasts the same fully-specified (identical nonce, gas, fees) request to every
    /// configured RPC concurrently. Each provider signs and submits independently; since
    /// the inputs are identical, every RPC either accepts the same transaction or rejects
    /// it as a duplicate. The first RPC to hand back a hash wins.
    async fn broadcast_once(&self, tx: TransactionRequest) -> Option<B256> {
        let sends = self.config.rpc_urls.iter().map(|url| {
            let wallet = self.wallet.clone();
            let tx = tx.clone();
            async move {
                let provider = ProviderBuilder::new().wallet(wallet).on_http(url.parse().ok()?);
                let pending = provider.send_transaction(tx).await.ok()?;
                Some(*pending.tx_hash())
            }
        });

        join_all(sends).await.into_iter().flatten().next()
    }

    async fn poll_receipt(&self, hash: B256, deadline: Instant) -> Option<TransactionReceipt> {
        let provider = ProviderBuilder::new().on_http(self.config.rpc_urls[0].parse().ok()?);
        loop {
            if Instant::now() >= deadline {
                return None;
            }
            if let Ok(Some(receipt)) = provider.get_transaction_receipt(hash).await {
                return Some(receipt);
            }
            tokio::time::sleep(Duration::from_millis(RECEIPT_POLL_MS)).await;
        }
    }

    /// Broadcasts `calldata` to `to`, bumping fees and re-broadcasting under the same
    /// nonce up to `replace_max_attempts` times if no receipt lands within
    /// `replace_after_ms`.
    pub async fn send_with_replacement(&self, to: Address, calldata: Bytes, initial_fees: Eip1559Fees) -> BroadcastOutcome {
        let nonce = self.nonce_manager.next();
        let mut fees = initial_fees;
        let mut last_hash: Option<B256> = None;

        for attempt in 0..=self.config.replace_max_attempts {
            let tx = self.build_tx(to, &calldata, U256::ZERO, nonce, fees);
            let hash = match self.broadcast_once(tx).await {
                Some(h) => h,
                None => {
                    if attempt == self.config.replace_max_attempts {
                        return BroadcastOutcome::Failed {
                            error: "all RPC broadcasts failed".to_string(),
                            last_hash,
                        };
                    }
                    fees = fees.bumped(self.config.fee_bump_pct);
                    self.replacements_sent.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };
            last_hash = Some(hash);
            info!(%hash, nonce, attempt, "broadcast sent");

            let deadline = Instant::now() + Duration::from_millis(self.config.replace_after_ms);
            match self.poll_receipt(hash, deadline).await {
                Some(receipt) => {
                    if receipt.status() {
                        return BroadcastOutcome::Mined { hash, receipt };
                    }
                    return BroadcastOutcome::Failed {
                        error: "transaction reverted".to_string(),
                        last_hash: Some(hash),
                    };
                }
                None if attempt < self.config.replace_max_attempts => {
                    fees = fees.bumped(self.config.fee_bump_pct);
                    self.replacements_sent.fetch_add(1, Ordering::Relaxed);
                    warn!(nonce, attempt, new_max_fee = fees.max_fee_per_gas, "no receipt, bumping fees and resubmitting");
                }
                None => {
                    return BroadcastOutcome::Pending { hash };
                }
            }
        }

        BroadcastOutcome::Pending {
            hash: last_hash.expect("at least one broadcast attempt always runs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S5 — fee-bump sequence: 1.0/1.2/1.44/1.728 gwei priority, 50/60/72/86.4 gwei max.
    #[test]
    fn s5_fee_bump_sequence_matches_worked_example() {
        let gwei = 1_000_000_000u128;
        let mut fees = Eip1559Fees {
            max_priority_fee_per_gas: 1 * gwei,
            max_fee_per_gas: 50 * gwei,
        };

        let expected_priority = [1.0, 1.2, 1.44];
        let expected_max = [50.0, 60.0, 72.0];

        for i in 0..3 {
            assert!(
                (fees.max_priority_fee_per_gas as f64 / gwei as f64 - expected_priority[i]).abs() < 0.01
            );
            assert!((fees.max_fee_per_gas as f64 / gwei as f64 - expected_max[i]).abs() < 0.01);
            fees = fees.bumped(20);
        }

        assert!((fees.max_priority_fee_per_gas as f64 / gwei as f64 - 1.728).abs() < 0.01);
        assert!((fees.max_fee_per_gas as f64 / gwei as f64 - 86.4).abs() < 0.01);
    }
}
