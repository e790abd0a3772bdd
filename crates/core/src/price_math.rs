//! Price resolution and 1e18-scaled arithmetic.
//!
//! Wraps the bot's existing [`crate::u256_math`] primitives with a priority-chain
//! price resolver (cache ← stream ← direct feed ← composite/ratio feed) and
//! per-source hit counters. All arithmetic stays in `U256`; floats appear only
//! at `calculate_usd_value`'s return boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::BotError;
use crate::u256_math::{self, WAD};

/// Default freshness window for a cached price (seconds).
pub const DEFAULT_PRICE_TTL_SECS: u64 = 30;

/// Origin of a resolved price, used for per-source hit counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceSource {
    Cache,
    Stream,
    Feed,
    Composite,
}

/// A single resolved price sample, 1e18-scaled.
#[derive(Debug, Clone, Copy)]
pub struct PriceSample {
    pub price: U256,
    pub timestamp_ms: u64,
    pub source: PriceSource,
}

/// Reads a price directly from an on-chain (or off-chain) feed for one token.
/// Implemented by the chain crate's oracle reader; kept as a trait here so
/// `price_math` has no direct RPC dependency.
#[async_trait]
pub trait DirectFeedReader: Send + Sync {
    async fn read_price(&self, token: Address) -> Result<U256, BotError>;
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Priority-chain price resolver with a shared cache and per-source counters.
pub struct PriceMath {
    cache: DashMap<Address, PriceSample>,
    decimals: DashMap<Address, u8>,
    /// Composite feed mapping: asset -> anchor asset (e.g. stETH -> ETH).
    composite_anchors: HashMap<Address, Address>,
    feed_reader: Option<Arc<dyn DirectFeedReader>>,
    ttl: Duration,
    hits_cache: AtomicU64,
    hits_stream: AtomicU64,
    hits_feed: AtomicU64,
    hits_composite: AtomicU64,
}

impl PriceMath {
    pub fn new(feed_reader: Option<Arc<dyn DirectFeedReader>>) -> Self {
        Self {
            cache: DashMap::new(),
            decimals: DashMap::new(),
            composite_anchors: HashMap::new(),
            feed_reader,
            ttl: Duration::from_secs(DEFAULT_PRICE_TTL_SECS),
            hits_cache: AtomicU64::new(0),
            hits_stream: AtomicU64::new(0),
            hits_feed: AtomicU64::new(0),
            hits_composite: AtomicU64::new(0),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_composite_anchor(mut self, asset: Address, anchor: Address) -> Self {
        self.composite_anchors.insert(asset, anchor);
        self
    }

    /// Called by the Price Stream whenever it decodes a fresh tick.
    pub fn update_cached_price(&self, token: Address, price_1e18: U256) {
        self.cache.insert(
            token,
            PriceSample {
                price: price_1e18,
                timestamp_ms: now_ms(),
                source: PriceSource::Stream,
            },
        );
    }

    pub fn cache_decimals(&self, token: Address, decimals: u8) {
        self.decimals.entry(token).or_insert(decimals);
    }

    pub fn cached_decimals(&self, token: Address) -> Option<u8> {
        self.decimals.get(&token).map(|d| *d)
    }

    fn record_hit(&self, source: PriceSource) {
        match source {
            PriceSource::Cache => self.hits_cache.fetch_add(1, Ordering::Relaxed),
            PriceSource::Stream => self.hits_stream.fetch_add(1, Ordering::Relaxed),
            PriceSource::Feed => self.hits_feed.fetch_add(1, Ordering::Relaxed),
            PriceSource::Composite => self.hits_composite.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Priority chain: fresh cache -> direct feed -> composite ratio feed -> stale cache -> fail.
    pub async fn get_usd_price(&self, token: Address) -> Result<U256, BotError> {
        if let Some(sample) = self.cache.get(&token) {
            let age_ms = now_ms().saturating_sub(sample.timestamp_ms);
            if age_ms <= self.ttl.as_millis() as u64 {
                self.record_hit(PriceSource::Cache);
                return Ok(sample.price);
            }
        }

        if let Some(reader) = &self.feed_reader {
            if let Ok(price) = reader.read_price(token).await {
                self.record_hit(PriceSource::Feed);
                self.cache.insert(
                    token,
                    PriceSample {
                        price,
                        timestamp_ms: now_ms(),
                        source: PriceSource::Feed,
                    },
                );
                return Ok(price);
            }

            if let Some(anchor) = self.composite_anchors.get(&token).copied() {
                if let (Ok(ratio), Ok(anchor_usd)) =
                    (reader.read_price(token).await, reader.read_price(anchor).await)
                {
                    let composite = u256_math::wad_mul(ratio, anchor_usd);
                    self.record_hit(PriceSource::Composite);
                    self.cache.insert(
                        token,
                        PriceSample {
                            price: composite,
                            timestamp_ms: now_ms(),
                            source: PriceSource::Composite,
                        },
                    );
                    return Ok(composite);
                }
            }
        }

        // Stale cache is the last resort, still reported via the stream counter
        // since it reflects the last push-stream write.
        if let Some(sample) = self.cache.get(&token) {
            self.record_hit(PriceSource::Stream);
            return Ok(sample.price);
        }

        Err(BotError::PriceUnavailable { asset: token })
    }

    /// Normalizes `raw_amount` (at `decimals`) by `price_1e18` to a display-only USD float.
    pub fn calculate_usd_value(raw_amount: U256, decimals: u8, price_1e18: U256) -> f64 {
        let normalized = normalize_to_e18(raw_amount, decimals);
        let usd_wad = u256_math::wad_mul(normalized, price_1e18);
        u256_math::wad_to_f64(usd_wad)
    }

    pub fn counters(&self) -> PriceSourceCounters {
        PriceSourceCounters {
            cache: self.hits_cache.load(Ordering::Relaxed),
            stream: self.hits_stream.load(Ordering::Relaxed),
            feed: self.hits_feed.load(Ordering::Relaxed),
            composite: self.hits_composite.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceSourceCounters {
    pub cache: u64,
    pub stream: u64,
    pub feed: u64,
    pub composite: u64,
}

/// Normalize a raw token amount to 1e18 scale given its native decimals.
pub fn normalize_to_e18(amount: U256, decimals: u8) -> U256 {
    if decimals < 18 {
        amount * u256_math::pow10(18 - decimals)
    } else if decimals > 18 {
        amount / u256_math::pow10(decimals - 18)
    } else {
        amount
    }
}

/// Inverse of [`normalize_to_e18`].
pub fn denormalize_from_e18(amount_1e18: U256, decimals: u8) -> U256 {
    if decimals < 18 {
        amount_1e18 / u256_math::pow10(18 - decimals)
    } else if decimals > 18 {
        amount_1e18 * u256_math::pow10(decimals - 18)
    } else {
        amount_1e18
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_round_trip_is_identity_for_exact_amounts() {
        // 1000 USDC (6 decimals), exactly representable after round-trip.
        let amount = U256::from(1000_000000u64);
        let e18 = normalize_to_e18(amount, 6);
        assert_eq!(e18, U256::from(1000u64) * WAD);
        assert_eq!(denormalize_from_e18(e18, 6), amount);
    }

    #[test]
    fn cache_hit_within_ttl_increments_cache_counter() {
        let math = PriceMath::new(None);
        let token = Address::repeat_byte(1);
        math.update_cached_price(token, WAD);

        let result = futures::executor::block_on(math.get_usd_price(token)).unwrap();
        assert_eq!(result, WAD);
        assert_eq!(math.counters().cache, 1);
    }

    #[test]
    fn unavailable_price_without_cache_or_feed_errors() {
        let math = PriceMath::new(None);
        let token = Address::repeat_byte(2);
        let result = futures::executor::block_on(math.get_usd_price(token));
        assert!(matches!(result, Err(BotError::PriceUnavailable { .. })));
    }

    #[test]
    fn calculate_usd_value_matches_u256_math() {
        let amount = U256::from(1_500_000_000_000_000_000u128); // 1.5 (18 dec)
        let price = U256::from(2000u64) * WAD;
        let usd = PriceMath::calculate_usd_value(amount, 18, price);
        assert!((usd - 3000.0).abs() < 0.001);
    }
}
