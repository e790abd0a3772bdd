//! Long-lived WebSocket client for a Pyth-style price-push service.
//!
//! Grounded on the teacher's `oracle_monitor.rs`/`dual_oracle.rs` long-lived
//! subscribe-then-loop shape and `scanner.rs::oracle_event_loop`'s retry-wrapper: on
//! disconnect, sleep with exponential backoff and resubscribe, never letting a
//! connection error propagate out to subscribers. The wire protocol itself (JSON
//! `subscribe`/`price_update` messages) has no teacher counterpart — the teacher only
//! ever reads prices by polling Chainlink-style on-chain aggregators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::price_math::PriceMath;

/// Reject any tick older than this many seconds by the time it's processed.
pub const DEFAULT_STALE_SECS: u64 = 60;
/// Backoff cap between reconnect attempts.
pub const MAX_BACKOFF_SECS: u64 = 60;
/// Give up reconnecting after this many consecutive failures.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// One decoded price tick from the push stream.
#[derive(Debug, Clone, Copy)]
pub struct PriceTick {
    pub feed_id: [u8; 32],
    pub price_int: i64,
    pub conf: u64,
    pub expo: i32,
    pub publish_time_sec: u64,
}

impl PriceTick {
    /// Converts the fixed-point `(priceInt, expo)` pair to a 1e18-scaled `U256`.
    /// Negative `priceInt` (an upstream protocol violation for a price feed) maps to zero.
    pub fn price_1e18(&self) -> U256 {
        if self.price_int <= 0 {
            return U256::ZERO;
        }
        let base = U256::from(self.price_int as u64);
        let shift = 18 + self.expo;
        if shift >= 0 {
            base * crate::u256_math::pow10(shift as u8)
        } else {
            base / crate::u256_math::pow10((-shift) as u8)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireMessage {
    #[serde(rename = "price_update")]
    PriceUpdate { price_feed: WireFeed },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireFeed {
    id: String,
    price: WirePrice,
    publish_time: u64,
}

#[derive(Debug, Deserialize)]
struct WirePrice {
    price: String,
    conf: String,
    expo: i32,
}

fn decode_feed_id(hex_id: &str) -> Option<[u8; 32]> {
    let trimmed = hex_id.trim_start_matches("0x");
    let bytes = hex::decode(trimmed).ok()?;
    bytes.try_into().ok()
}

fn now_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Parses one wire message into a [`PriceTick`], rejecting samples that are already
/// stale by the time they're observed.
pub fn parse_tick(raw: &str, stale_secs: u64) -> Option<PriceTick> {
    let msg: WireMessage = serde_json::from_str(raw).ok()?;
    let WireMessage::PriceUpdate { price_feed } = msg else {
        return None;
    };

    let feed_id = decode_feed_id(&price_feed.id)?;
    let price_int: i64 = price_feed.price.price.parse().ok()?;
    let conf: u64 = price_feed.price.conf.parse().ok()?;
    let tick = PriceTick {
        feed_id,
        price_int,
        conf,
        expo: price_feed.price.expo,
        publish_time_sec: price_feed.publish_time,
    };

    if now_secs().saturating_sub(tick.publish_time_sec) > stale_secs {
        return None;
    }
    Some(tick)
}

/// A subscribed asset: the feed id to watch and the token address its price applies to.
#[derive(Debug, Clone, Copy)]
pub struct FeedSubscription {
    pub feed_id: [u8; 32],
    pub asset: Address,
}

/// Long-lived push-price client. Fans ticks out to [`PriceMath`]'s cache and to any
/// `broadcast` subscribers (the Predictive Loop).
pub struct PriceStream {
    url: String,
    subscriptions: Vec<FeedSubscription>,
    price_math: Arc<PriceMath>,
    stale_secs: u64,
    tick_tx: broadcast::Sender<(Address, PriceTick)>,
    reconnects: AtomicU64,
}

impl PriceStream {
    pub fn new(url: String, subscriptions: Vec<FeedSubscription>, price_math: Arc<PriceMath>) -> Self {
        let (tick_tx, _) = broadcast::channel(256);
        Self {
            url,
            subscriptions,
            price_math,
            stale_secs: DEFAULT_STALE_SECS,
            tick_tx,
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn with_stale_secs(mut self, stale_secs: u64) -> Self {
        self.stale_secs = stale_secs;
        self
    }

    pub fn subscribe_ticks(&self) -> broadcast::Receiver<(Address, PriceTick)> {
        self.tick_tx.subscribe()
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    fn asset_for_feed(&self, feed_id: &[u8; 32]) -> Option<Address> {
        self.subscriptions
            .iter()
            .find(|s| &s.feed_id == feed_id)
            .map(|s| s.asset)
    }

    /// Runs until `shutdown` fires. Reconnects with exponential backoff on any
    /// connection error; gives up (logging) after `MAX_RECONNECT_ATTEMPTS` consecutive
    /// failures, but never panics or returns an error subscribers would see.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return;
            }

            match self.connect_and_stream(&mut shutdown).await {
                Ok(()) => {
                    info!("price stream closed cleanly");
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    self.reconnects.fetch_add(1, Ordering::Relaxed);
                    if attempt > MAX_RECONNECT_ATTEMPTS {
                        error!(error = %e, attempts = attempt, "price stream giving up after max reconnect attempts");
                        return;
                    }
                    let backoff = Duration::from_secs((1u64 << attempt.min(6)).min(MAX_BACKOFF_SECS));
                    warn!(error = %e, attempt, backoff_secs = backoff.as_secs(), "price stream reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
                    }
                }
            }
        }
    }

    async fn connect_and_stream(
        &self,
        shutdown: &mut tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), String> {
        let (mut ws, _) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| e.to_string())?;

        let ids: Vec<String> = self
            .subscriptions
            .iter()
            .map(|s| format!("0x{}", hex::encode(s.feed_id)))
            .collect();
        let subscribe = serde_json::json!({ "type": "subscribe", "ids": ids });
        ws.send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| e.to_string())?;

        loop {
            tokio::select! {
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(tick) = parse_tick(&text, self.stale_secs) {
                                if let Some(asset) = self.asset_for_feed(&tick.feed_id) {
                                    self.price_math.update_cached_price(asset, tick.price_1e18());
                                    let _ = self.tick_tx.send((asset, tick));
                                }
                            } else {
                                debug!("dropped stale or undecodable price tick");
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err("connection closed by peer".to_string());
                        }
                        Some(Err(e)) => return Err(e.to_string()),
                        _ => {}
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tick_accepts_fresh_sample() {
        let raw = serde_json::json!({
            "type": "price_update",
            "price_feed": {
                "id": "ff".repeat(32),
                "price": { "price": "123456", "conf": "10", "expo": -2 },
                "publish_time": now_secs(),
            }
        })
        .to_string();
        let tick = parse_tick(&raw, 60).expect("fresh tick should parse");
        assert_eq!(tick.price_int, 123456);
        assert_eq!(tick.expo, -2);
    }

    #[test]
    fn parse_tick_rejects_stale_sample() {
        let raw = serde_json::json!({
            "type": "price_update",
            "price_feed": {
                "id": "aa".repeat(32),
                "price": { "price": "100", "conf": "1", "expo": 0 },
                "publish_time": now_secs().saturating_sub(300),
            }
        })
        .to_string();
        assert!(parse_tick(&raw, 60).is_none());
    }

    #[test]
    fn price_1e18_applies_negative_expo() {
        let tick = PriceTick {
            feed_id: [0u8; 32],
            price_int: 123456,
            conf: 0,
            expo: -2,
            publish_time_sec: 0,
        };
        // 123456 * 10^-2 = 1234.56, scaled to 1e18.
        assert_eq!(
            tick.price_1e18(),
            U256::from(123456u64) * crate::u256_math::pow10(16)
        );
    }

    #[test]
    fn non_price_update_messages_are_ignored() {
        let raw = serde_json::json!({ "type": "subscribe_ack" }).to_string();
        assert!(parse_tick(&raw, 60).is_none());
    }
}
