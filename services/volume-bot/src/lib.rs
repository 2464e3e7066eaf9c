//! Volume Bot Library
//!
//! Personality-driven trading agents for a bonding-curve token factory.

pub mod cache;
pub mod config;
pub mod creator;
pub mod curve;
pub mod decision;
pub mod error;
pub mod evm;
pub mod executor;
pub mod gateway;
pub mod loader;
pub mod notifier;
pub mod retry;
pub mod runner;
pub mod types;

// Re-export main types for convenience
pub use cache::{CachedToken, TokenCache};
pub use config::{BotConfig, CacheConfig, Config, ExecutionConfig, Mood, Personality, Phrases};
pub use curve::BondingCurve;
pub use decision::{Decision, DecisionEngine, Holdings, SkipReason};
pub use error::{CacheError, ConfigError, GatewayError};
pub use evm::EvmGateway;
pub use executor::{ExecutionOutcome, TradeExecutor};
pub use gateway::{ChainGateway, GatewayResult};
pub use loader::TokenLoader;
pub use notifier::{BotEvent, EventKind, LogNotifier, Notifier, WebhookConfig, WebhookNotifier};
pub use retry::RetryConfig;
pub use runner::{BotRunner, CycleOutcome, LoopState, TradeAbort};
pub use types::{Receipt, TokenState, TradeSide, TradeTransaction, TradeableToken};
