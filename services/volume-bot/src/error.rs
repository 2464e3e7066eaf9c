//! Error types for the volume bot

use thiserror::Error;

/// Errors surfaced by a [`ChainGateway`](crate::gateway::ChainGateway)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    #[error("Transaction underpriced: {0}")]
    Underpriced(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// Whether a resubmission of the same transaction may succeed.
    ///
    /// Nonce contention, underpriced gas and transport hiccups clear up on
    /// their own; everything else is a property of the transaction itself.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport(_) | GatewayError::NonceConflict(_) | GatewayError::Underpriced(_)
        )
    }
}

/// Errors from reading or writing the token cache file
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors from loading or validating a bot configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("No private key available for bot {0}")]
    MissingKey(String),
}
