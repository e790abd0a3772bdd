//! Adapts `liquidator_api::AggregatorClient` to the planner's `SwapQuoter` trait.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use liquidator_api::{AggregatorClient, AggregatorError};

use crate::error::BotError;
use crate::planner::{SwapQuote, SwapQuoter};

impl From<AggregatorError> for BotError {
    fn from(err: AggregatorError) -> Self {
        match err {
            AggregatorError::Timeout => BotError::AggregatorTimeout,
            AggregatorError::Unavailable(msg) | AggregatorError::MalformedResponse(msg) => {
                BotError::AggregatorUnavailable(msg)
            }
        }
    }
}

/// Wraps an `AggregatorClient`, dropping the `value`/native-ETH leg of its quote:
/// the executor contract only ever swaps ERC-20 debt/collateral pairs.
pub struct AggregatorSwapQuoter {
    client: AggregatorClient,
}

impl AggregatorSwapQuoter {
    pub fn new(client: AggregatorClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SwapQuoter for AggregatorSwapQuoter {
    async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        slippage_bps: u16,
        recipient: Address,
    ) -> Result<SwapQuote, BotError> {
        let quote = self
            .client
            .quote(token_in, token_out, amount_in, slippage_bps, recipient)
            .await?;

        Ok(SwapQuote {
            to: quote.to,
            calldata: quote.calldata,
            min_out: quote.min_out,
        })
    }
}
