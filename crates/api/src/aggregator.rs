//! HTTP client for the external swap aggregator (1inch-style GET quote endpoint).
//!
//! Grounded directly on `liqd.rs`'s `LiqdClient::get_swap_route`: a GET request with
//! query parameters, a short hard timeout, and defensive parsing that accepts either of
//! two field-name conventions rather than trusting a single schema. Unlike `liqd.rs`
//! there is no route cache here — every quote is the safety-critical input to a
//! liquidation plan and must reflect the current market.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use serde::Deserialize;
use tracing::instrument;

/// Default hard timeout for an aggregator request.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("aggregator request timed out")]
    Timeout,
    #[error("aggregator unavailable: {0}")]
    Unavailable(String),
    #[error("aggregator response missing or malformed field: {0}")]
    MalformedResponse(String),
}

/// A swap quote ready to be embedded in a liquidation plan.
#[derive(Debug, Clone)]
pub struct AggregatorQuote {
    pub to: Address,
    pub calldata: Bytes,
    pub value: U256,
    pub min_out: U256,
}

#[derive(Debug, Deserialize)]
struct RawTx {
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuoteResponse {
    #[serde(default)]
    tx: Option<RawTx>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default, rename = "dstAmount")]
    dst_amount: Option<String>,
    #[serde(default, rename = "toAmount")]
    to_amount: Option<String>,
}

fn parse_address(s: &str) -> Option<Address> {
    s.parse().ok()
}

fn parse_hex_bytes(s: &str) -> Option<Bytes> {
    let trimmed = s.trim_start_matches("0x");
    hex::decode(trimmed).ok().map(Bytes::from)
}

fn parse_u256_decimal(s: &str) -> Option<U256> {
    U256::from_str_radix(s, 10).ok()
}

impl RawQuoteResponse {
    fn into_quote(self) -> Result<AggregatorQuote, AggregatorError> {
        let to_str = self
            .tx
            .as_ref()
            .and_then(|t| t.to.clone())
            .or(self.to)
            .ok_or_else(|| AggregatorError::MalformedResponse("to".into()))?;
        let data_str = self
            .tx
            .as_ref()
            .and_then(|t| t.data.clone())
            .or(self.data)
            .ok_or_else(|| AggregatorError::MalformedResponse("data".into()))?;
        let value_str = self
            .tx
            .as_ref()
            .and_then(|t| t.value.clone())
            .unwrap_or_else(|| "0".to_string());
        let min_out_str = self
            .dst_amount
            .or(self.to_amount)
            .ok_or_else(|| AggregatorError::MalformedResponse("dstAmount/toAmount".into()))?;

        let to = parse_address(&to_str).ok_or_else(|| AggregatorError::MalformedResponse("to".into()))?;
        let calldata = parse_hex_bytes(&data_str).ok_or_else(|| AggregatorError::MalformedResponse("data".into()))?;
        let value = parse_u256_decimal(&value_str).unwrap_or(U256::ZERO);
        let min_out = parse_u256_decimal(&min_out_str)
            .ok_or_else(|| AggregatorError::MalformedResponse("dstAmount".into()))?;

        if min_out.is_zero() {
            return Err(AggregatorError::MalformedResponse("dstAmount is zero".into()));
        }

        Ok(AggregatorQuote {
            to,
            calldata,
            value,
            min_out,
        })
    }
}

/// Thin HTTP client for the configured swap aggregator.
pub struct AggregatorClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AggregatorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Requests a swap quote `token_in -> token_out` for `amount_in`, with `slippage_bps`
    /// passed through to the aggregator's own slippage model.
    #[instrument(skip(self), fields(token_in = %token_in, token_out = %token_out))]
    pub async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        slippage_bps: u16,
        recipient: Address,
    ) -> Result<AggregatorQuote, AggregatorError> {
        let slippage_pct = slippage_bps as f64 / 100.0;

        let response = tokio::time::timeout(
            self.timeout,
            self.http
                .get(&self.base_url)
                .query(&[
                    ("src", token_in.to_string()),
                    ("dst", token_out.to_string()),
                    ("amount", amount_in.to_string()),
                    ("from", recipient.to_string()),
                    ("slippage", format!("{slippage_pct}")),
                    ("disableEstimate", "true".to_string()),
                ])
                .send(),
        )
        .await
        .map_err(|_| AggregatorError::Timeout)?
        .map_err(|e| AggregatorError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AggregatorError::Unavailable(format!(
                "status {}",
                response.status()
            )));
        }

        let raw: RawQuoteResponse = response
            .json()
            .await
            .map_err(|e| AggregatorError::MalformedResponse(e.to_string()))?;

        raw.into_quote()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_tx_field_convention() {
        let raw: RawQuoteResponse = serde_json::from_str(
            r#"{"tx": {"to": "0x0000000000000000000000000000000000000001", "data": "0x1234", "value": "0"}, "dstAmount": "1000"}"#,
        )
        .unwrap();
        let quote = raw.into_quote().unwrap();
        assert_eq!(quote.min_out, U256::from(1000u64));
    }

    #[test]
    fn parses_flat_field_convention() {
        let raw: RawQuoteResponse = serde_json::from_str(
            r#"{"to": "0x0000000000000000000000000000000000000001", "data": "0xabcd", "toAmount": "2000"}"#,
        )
        .unwrap();
        let quote = raw.into_quote().unwrap();
        assert_eq!(quote.min_out, U256::from(2000u64));
    }

    #[test]
    fn zero_min_out_is_rejected() {
        let raw: RawQuoteResponse = serde_json::from_str(
            r#"{"to": "0x0000000000000000000000000000000000000001", "data": "0x00", "dstAmount": "0"}"#,
        )
        .unwrap();
        assert!(raw.into_quote().is_err());
    }

    #[test]
    fn missing_to_field_is_rejected() {
        let raw: RawQuoteResponse =
            serde_json::from_str(r#"{"data": "0x00", "dstAmount": "100"}"#).unwrap();
        assert!(raw.into_quote().is_err());
    }
}
