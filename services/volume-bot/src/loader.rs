//! Token discovery
//!
//! Reconciles the factory's token list with the bot's cache. A fresh cache
//! takes the fast path (one state read per token); anything unexpected on
//! the fast path falls back to a full refresh of state and metadata.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::TokenCache;
use crate::gateway::{ChainGateway, GatewayResult};
use crate::types::TradeableToken;

/// Why the fast path gave up
#[derive(Debug)]
enum FastPathAbort {
    CacheMiss(String),
    StateQueryFailed(String),
}

pub struct TokenLoader {
    gateway: Arc<dyn ChainGateway>,
}

impl TokenLoader {
    pub fn new(gateway: Arc<dyn ChainGateway>) -> Self {
        Self { gateway }
    }

    /// Discover the tokens tradeable right now.
    ///
    /// Never fails: a failed address listing yields an empty set and the
    /// caller tries again next cycle. The cache is saved on every call that
    /// got past the listing.
    pub async fn load_tradeable_tokens(&self, cache: &mut TokenCache) -> Vec<TradeableToken> {
        let started = Instant::now();

        let addresses = match self.gateway.all_token_addresses().await {
            Ok(addresses) => addresses,
            Err(e) => {
                error!("Token listing failed: {}", e);
                return Vec::new();
            }
        };
        debug!("Factory returned {} token addresses", addresses.len());

        cache.clear_stale_tokens(&addresses);

        let tokens = if cache.is_fresh() {
            match self.fast_path(cache, &addresses).await {
                Ok(tokens) => tokens,
                Err(reason) => {
                    info!("Fast path abandoned ({:?}), doing full refresh", reason);
                    self.full_refresh(cache, &addresses).await
                }
            }
        } else {
            self.full_refresh(cache, &addresses).await
        };

        if let Err(e) = cache.save() {
            warn!("Failed to save token cache: {}", e);
        }

        info!(
            "Loaded {} tradeable tokens of {} in {:.2}s",
            tokens.len(),
            addresses.len(),
            started.elapsed().as_secs_f64()
        );
        tokens
    }

    /// Re-check live state for cached tokens only; metadata is trusted
    async fn fast_path(
        &self,
        cache: &mut TokenCache,
        addresses: &[String],
    ) -> Result<Vec<TradeableToken>, FastPathAbort> {
        debug!("Using fresh cache for {} tokens", addresses.len());
        let mut tradeable = Vec::new();

        for address in addresses {
            let (name, symbol) = match cache.get_token(address) {
                Some(cached) => (cached.name.clone(), cached.symbol.clone()),
                None => return Err(FastPathAbort::CacheMiss(address.clone())),
            };

            let state = self
                .gateway
                .token_state(address)
                .await
                .map_err(|e| {
                    warn!(address = %address, "State check failed: {}", e);
                    FastPathAbort::StateQueryFailed(address.clone())
                })?;

            cache.store_token(address, &name, &symbol, state, None);

            if state.is_tradeable() {
                tradeable.push(TradeableToken {
                    address: address.clone(),
                    name,
                    symbol,
                });
            }
        }

        Ok(tradeable)
    }

    /// Read state and metadata for every listed token.
    /// Per-token failures are logged and skipped.
    async fn full_refresh(&self, cache: &mut TokenCache, addresses: &[String]) -> Vec<TradeableToken> {
        info!("Performing full token refresh of {} tokens", addresses.len());
        let total = addresses.len();
        let mut tradeable = Vec::new();

        for (i, address) in addresses.iter().enumerate() {
            match self.read_token(address).await {
                Ok(token) => {
                    let (state, name, symbol) = token;
                    cache.store_token(address, &name, &symbol, state, None);
                    debug!(
                        "[{}/{}] {} ({}) state={}",
                        i + 1,
                        total,
                        symbol,
                        name,
                        state
                    );
                    if state.is_tradeable() {
                        tradeable.push(TradeableToken {
                            address: address.clone(),
                            name,
                            symbol,
                        });
                    }
                }
                Err(e) => {
                    warn!(address = %address, "[{}/{}] Skipping token: {}", i + 1, total, e);
                }
            }
        }

        cache.mark_full_refresh();
        tradeable
    }

    async fn read_token(
        &self,
        address: &str,
    ) -> GatewayResult<(crate::types::TokenState, String, String)> {
        let state = self.gateway.token_state(address).await?;
        let metadata = self.gateway.token_metadata(address).await?;
        Ok((state, metadata.name, metadata.symbol))
    }
}
