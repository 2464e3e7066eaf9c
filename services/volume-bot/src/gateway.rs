//! Chain gateway abstraction
//!
//! Everything the bot needs from the node: reads against the token factory,
//! wallet balances, and signed submission of trade transactions. The live
//! implementation is [`EvmGateway`](crate::evm::EvmGateway); tests script
//! their own.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::error::GatewayError;
use crate::types::{Receipt, TokenMetadata, TokenState, TradeEstimate, TradeSide, TradeTransaction};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Every token address the factory has ever issued
    async fn all_token_addresses(&self) -> GatewayResult<Vec<String>>;

    /// Live lifecycle state of a token
    async fn token_state(&self, address: &str) -> GatewayResult<TokenState>;

    /// Name and symbol from the token contract
    async fn token_metadata(&self, address: &str) -> GatewayResult<TokenMetadata>;

    /// Quote a buy (native in) or sell (tokens in) against the curve
    async fn estimate_trade(
        &self,
        address: &str,
        side: TradeSide,
        amount: Decimal,
    ) -> GatewayResult<TradeEstimate>;

    /// Address of the signing wallet
    fn wallet_address(&self) -> String;

    /// Native currency balance of the signing wallet
    async fn native_balance(&self) -> GatewayResult<Decimal>;

    /// Token balance of the signing wallet
    async fn token_balance(&self, address: &str) -> GatewayResult<Decimal>;

    /// Sign and broadcast, returning the transaction hash
    async fn submit_transaction(&self, tx: &TradeTransaction) -> GatewayResult<String>;

    /// Wait up to `timeout` for the receipt. `None` when not mined in time.
    async fn get_receipt(&self, tx_hash: &str, timeout: Duration) -> GatewayResult<Option<Receipt>>;
}
