//! Shared domain types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a factory token, as reported on chain.
///
/// Encoded as a small integer in both the contract and the cache file.
/// Values outside the known range are kept as `Unknown` rather than
/// rejected, so a factory upgrade never poisons a cache snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum TokenState {
    NotCreated,
    Trading,
    GoalReached,
    Halted,
    Resumed,
    Unknown(u8),
}

impl TokenState {
    /// Only `Trading` and `Resumed` tokens accept buys and sells
    pub fn is_tradeable(self) -> bool {
        matches!(self, TokenState::Trading | TokenState::Resumed)
    }
}

impl From<u8> for TokenState {
    fn from(value: u8) -> Self {
        match value {
            0 => TokenState::NotCreated,
            1 => TokenState::Trading,
            2 => TokenState::GoalReached,
            3 => TokenState::Halted,
            4 => TokenState::Resumed,
            other => TokenState::Unknown(other),
        }
    }
}

impl From<TokenState> for u8 {
    fn from(state: TokenState) -> Self {
        match state {
            TokenState::NotCreated => 0,
            TokenState::Trading => 1,
            TokenState::GoalReached => 2,
            TokenState::Halted => 3,
            TokenState::Resumed => 4,
            TokenState::Unknown(other) => other,
        }
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenState::NotCreated => write!(f, "NOT_CREATED"),
            TokenState::Trading => write!(f, "TRADING"),
            TokenState::GoalReached => write!(f, "GOAL_REACHED"),
            TokenState::Halted => write!(f, "HALTED"),
            TokenState::Resumed => write!(f, "RESUMED"),
            TokenState::Unknown(n) => write!(f, "UNKNOWN({})", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Display metadata read from a token contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
}

/// A token the bot may trade this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeableToken {
    pub address: String,
    pub name: String,
    pub symbol: String,
}

/// On-chain quote for a prospective trade.
///
/// `expected_out` is tokens for a buy and native currency for a sell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeEstimate {
    pub expected_out: Decimal,
    pub virtual_supply: Decimal,
}

/// A transaction the bot wants signed and broadcast
#[derive(Debug, Clone, PartialEq)]
pub enum TradeTransaction {
    Buy {
        token: String,
        native_amount: Decimal,
        min_tokens_out: Decimal,
    },
    Sell {
        token: String,
        token_amount: Decimal,
        min_native_out: Decimal,
    },
    Create {
        name: String,
        symbol: String,
        image_url: String,
        native_amount: Decimal,
    },
}

impl TradeTransaction {
    pub fn kind(&self) -> &'static str {
        match self {
            TradeTransaction::Buy { .. } => "buy",
            TradeTransaction::Sell { .. } => "sell",
            TradeTransaction::Create { .. } => "create_token",
        }
    }

    /// Native currency leaving the wallet as `msg.value`
    pub fn native_value(&self) -> Decimal {
        match self {
            TradeTransaction::Buy { native_amount, .. } => *native_amount,
            TradeTransaction::Create { native_amount, .. } => *native_amount,
            TradeTransaction::Sell { .. } => Decimal::ZERO,
        }
    }
}

/// Mined transaction receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: String,
    pub success: bool,
    pub gas_used: u64,
    pub block_number: Option<u64>,
}
