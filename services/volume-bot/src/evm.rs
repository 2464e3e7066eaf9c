//! EVM chain gateway backed by alloy
//!
//! Talks to the bonding-curve token factory and its token contracts over
//! JSON-RPC. All amounts cross this boundary as 18-decimal `Decimal`s.

use alloy::network::{EthereumWallet, ReceiptResponse};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::sol;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::gateway::{ChainGateway, GatewayResult};
use crate::types::{Receipt, TokenMetadata, TokenState, TradeEstimate, TradeSide, TradeTransaction};

const DECIMALS: u32 = 18;
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

sol! {
    #[sol(rpc)]
    contract ITokenFactory {
        function getAllTokens() external view returns (address[] memory);
        function getTokenState(address token) external view returns (uint8);
        function virtualSupply(address token) external view returns (uint256);
        function calculateTokenAmount(address token, uint256 ethAmount) external view returns (uint256);
        function calculateSellPrice(address token, uint256 tokenAmount) external view returns (uint256);
        function buy(address token, uint256 minTokensOut) external payable;
        function sell(address token, uint256 tokenAmount, uint256 minEthOut) external;
        function createToken(
            string memory name,
            string memory symbol,
            string memory imageUrl,
            address burnManager,
            uint256 minTokensOut
        ) external payable returns (address);
    }
}

sol! {
    #[sol(rpc)]
    contract IBondingToken {
        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function balanceOf(address account) external view returns (uint256);
    }
}

pub struct EvmGateway {
    provider: DynProvider,
    factory: Address,
    wallet: Address,
}

impl EvmGateway {
    pub fn new(rpc_url: &str, factory: &str, private_key: &str, chain_id: u64) -> anyhow::Result<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid RPC URL {}: {}", rpc_url, e))?;
        let factory = Address::from_str(factory)
            .map_err(|e| anyhow::anyhow!("Invalid factory address {}: {}", factory, e))?;

        let mut signer = PrivateKeySigner::from_str(private_key.trim_start_matches("0x"))
            .map_err(|e| anyhow::anyhow!("Invalid private key: {}", e))?;
        signer.set_chain_id(Some(chain_id));
        let wallet = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        info!("EVM gateway ready: chain {} factory {} wallet {}", chain_id, factory, wallet);

        Ok(Self {
            provider,
            factory,
            wallet,
        })
    }

    fn factory(&self) -> ITokenFactory::ITokenFactoryInstance<&DynProvider> {
        ITokenFactory::new(self.factory, &self.provider)
    }
}

fn parse_address(address: &str) -> GatewayResult<Address> {
    Address::from_str(address).map_err(|e| GatewayError::Other(format!("Bad address {}: {}", address, e)))
}

pub fn to_wei(amount: Decimal) -> GatewayResult<U256> {
    if amount.is_sign_negative() {
        return Err(GatewayError::Other(format!("Negative amount {}", amount)));
    }
    let scaled = amount
        .checked_mul(Decimal::from(10u64.pow(DECIMALS)))
        .ok_or_else(|| GatewayError::Other(format!("Amount {} too large", amount)))?
        .trunc();
    let raw = scaled
        .to_u128()
        .ok_or_else(|| GatewayError::Other(format!("Amount {} out of range", amount)))?;
    Ok(U256::from(raw))
}

pub fn from_wei(value: U256) -> GatewayResult<Decimal> {
    let raw = u128::try_from(value)
        .map_err(|_| GatewayError::InvalidResponse(format!("Value {} out of range", value)))?;
    let raw = i128::try_from(raw)
        .map_err(|_| GatewayError::InvalidResponse(format!("Value {} out of range", value)))?;
    Decimal::try_from_i128_with_scale(raw, DECIMALS)
        .map(|d| d.normalize())
        .map_err(|e| GatewayError::InvalidResponse(format!("Value {} not representable: {}", value, e)))
}

/// Map a node or transport error message onto the retry taxonomy
pub fn classify_rpc_error(message: &str) -> GatewayError {
    let lower = message.to_lowercase();
    let msg = message.to_string();

    if lower.contains("underpriced") || lower.contains("fee too low") || lower.contains("max fee per gas less than") {
        GatewayError::Underpriced(msg)
    } else if lower.contains("nonce") || lower.contains("already known") {
        GatewayError::NonceConflict(msg)
    } else if lower.contains("insufficient funds") {
        GatewayError::InsufficientFunds(msg)
    } else if lower.contains("revert") {
        GatewayError::Reverted(msg)
    } else if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("rate limit")
        || lower.contains("429")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("temporarily unavailable")
    {
        GatewayError::Transport(msg)
    } else {
        GatewayError::Other(msg)
    }
}

fn rpc_err<E: std::fmt::Display>(e: E) -> GatewayError {
    classify_rpc_error(&e.to_string())
}

#[async_trait]
impl ChainGateway for EvmGateway {
    async fn all_token_addresses(&self) -> GatewayResult<Vec<String>> {
        let tokens = self.factory().getAllTokens().call().await.map_err(rpc_err)?;
        Ok(tokens.into_iter().map(|a| a.to_string()).collect())
    }

    async fn token_state(&self, address: &str) -> GatewayResult<TokenState> {
        let token = parse_address(address)?;
        let state = self.factory().getTokenState(token).call().await.map_err(rpc_err)?;
        Ok(TokenState::from(state))
    }

    async fn token_metadata(&self, address: &str) -> GatewayResult<TokenMetadata> {
        let token = IBondingToken::new(parse_address(address)?, &self.provider);
        let name = token.name().call().await.map_err(rpc_err)?;
        let symbol = token.symbol().call().await.map_err(rpc_err)?;
        Ok(TokenMetadata { name, symbol })
    }

    async fn estimate_trade(
        &self,
        address: &str,
        side: TradeSide,
        amount: Decimal,
    ) -> GatewayResult<TradeEstimate> {
        let token = parse_address(address)?;
        let factory = self.factory();
        let amount = to_wei(amount)?;

        let out = match side {
            TradeSide::Buy => factory.calculateTokenAmount(token, amount).call().await,
            TradeSide::Sell => factory.calculateSellPrice(token, amount).call().await,
        }
        .map_err(rpc_err)?;
        let supply = factory.virtualSupply(token).call().await.map_err(rpc_err)?;

        Ok(TradeEstimate {
            expected_out: from_wei(out)?,
            virtual_supply: from_wei(supply)?,
        })
    }

    fn wallet_address(&self) -> String {
        self.wallet.to_string()
    }

    async fn native_balance(&self) -> GatewayResult<Decimal> {
        let balance = self.provider.get_balance(self.wallet).await.map_err(rpc_err)?;
        from_wei(balance)
    }

    async fn token_balance(&self, address: &str) -> GatewayResult<Decimal> {
        let token = IBondingToken::new(parse_address(address)?, &self.provider);
        let balance = token.balanceOf(self.wallet).call().await.map_err(rpc_err)?;
        from_wei(balance)
    }

    async fn submit_transaction(&self, tx: &TradeTransaction) -> GatewayResult<String> {
        let factory = self.factory();

        let pending = match tx {
            TradeTransaction::Buy {
                token,
                native_amount,
                min_tokens_out,
            } => {
                factory
                    .buy(parse_address(token)?, to_wei(*min_tokens_out)?)
                    .value(to_wei(*native_amount)?)
                    .send()
                    .await
            }
            TradeTransaction::Sell {
                token,
                token_amount,
                min_native_out,
            } => {
                factory
                    .sell(parse_address(token)?, to_wei(*token_amount)?, to_wei(*min_native_out)?)
                    .send()
                    .await
            }
            TradeTransaction::Create {
                name,
                symbol,
                image_url,
                native_amount,
            } => {
                factory
                    .createToken(
                        name.clone(),
                        symbol.clone(),
                        image_url.clone(),
                        self.wallet,
                        U256::ZERO,
                    )
                    .value(to_wei(*native_amount)?)
                    .send()
                    .await
            }
        }
        .map_err(rpc_err)?;

        Ok(pending.tx_hash().to_string())
    }

    async fn get_receipt(&self, tx_hash: &str, timeout: Duration) -> GatewayResult<Option<Receipt>> {
        let hash = TxHash::from_str(tx_hash)
            .map_err(|e| GatewayError::Other(format!("Bad tx hash {}: {}", tx_hash, e)))?;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(receipt) = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(rpc_err)?
            {
                return Ok(Some(Receipt {
                    tx_hash: tx_hash.to_string(),
                    success: receipt.status(),
                    gas_used: receipt.gas_used,
                    block_number: receipt.block_number,
                }));
            }

            if Instant::now() + RECEIPT_POLL_INTERVAL > deadline {
                debug!("Receipt for {} not found before deadline", tx_hash);
                return Ok(None);
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}
