//! Trading decisions
//!
//! Every cycle draws, in this order, from the bot's own random source:
//!
//! 1. `u_create`: below `create_token_chance` launches a new token
//! 2. candidate index (uniform)
//! 3. `u_dir`: below `buy_bias` buys, otherwise sells
//! 4. `u_size`: trade size
//!
//! Size is `min + (max - min) * risk_tolerance * u_size`, so a bot with zero
//! risk tolerance always trades the minimum and a fully tolerant bot spans
//! the whole configured range. The amount is in native currency for every
//! action; sells are converted to a token amount at execution time.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::*;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Personality;
use crate::creator::{TokenConcept, TokenCreator};
use crate::error::GatewayError;
use crate::gateway::ChainGateway;
use crate::types::{TradeSide, TradeableToken};

/// Wei precision
const AMOUNT_DP: u32 = 18;

/// Source of the bot's token balances
#[async_trait]
pub trait Holdings: Send + Sync {
    async fn holding(&self, token: &str) -> Result<Decimal, GatewayError>;
}

#[async_trait]
impl Holdings for dyn ChainGateway {
    async fn holding(&self, token: &str) -> Result<Decimal, GatewayError> {
        self.token_balance(token).await
    }
}

#[async_trait]
impl Holdings for HashMap<String, Decimal> {
    async fn holding(&self, token: &str) -> Result<Decimal, GatewayError> {
        Ok(self
            .get(&token.to_lowercase())
            .or_else(|| self.get(token))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoCandidates,
    NoHolding,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Buy {
        token: TradeableToken,
        amount: Decimal,
    },
    Sell {
        token: TradeableToken,
        amount: Decimal,
        holding: Decimal,
    },
    Create {
        concept: TokenConcept,
        amount: Decimal,
    },
    Skip {
        reason: SkipReason,
    },
}

impl Decision {
    pub fn side(&self) -> Option<TradeSide> {
        match self {
            Decision::Buy { .. } => Some(TradeSide::Buy),
            Decision::Sell { .. } => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

pub struct DecisionEngine<R: Rng = StdRng> {
    personality: Personality,
    creator: TokenCreator,
    creation_amount: Decimal,
    rng: R,
}

impl DecisionEngine<StdRng> {
    pub fn new(bot_name: &str, personality: Personality, creation_amount: Decimal) -> Self {
        Self::with_rng(bot_name, personality, creation_amount, StdRng::from_entropy())
    }

    /// Deterministic engine for tests and replays
    pub fn from_seed(bot_name: &str, personality: Personality, creation_amount: Decimal, seed: u64) -> Self {
        Self::with_rng(bot_name, personality, creation_amount, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> DecisionEngine<R> {
    pub fn with_rng(bot_name: &str, personality: Personality, creation_amount: Decimal, rng: R) -> Self {
        let creator = TokenCreator::new(bot_name, &personality);
        Self {
            personality,
            creator,
            creation_amount,
            rng,
        }
    }

    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    pub async fn decide<H: Holdings + ?Sized>(
        &mut self,
        candidates: &[TradeableToken],
        holdings: &H,
    ) -> Decision {
        let u_create: f64 = self.rng.gen();
        if u_create < self.personality.create_token_chance {
            let concept = self.creator.generate(&mut self.rng);
            debug!("Decided to create {} (${})", concept.name, concept.symbol);
            return Decision::Create {
                concept,
                amount: self.creation_amount,
            };
        }

        if candidates.is_empty() {
            return Decision::Skip {
                reason: SkipReason::NoCandidates,
            };
        }

        let index = self.rng.gen_range(0..candidates.len());
        let u_dir: f64 = self.rng.gen();
        let u_size: f64 = self.rng.gen();

        let token = candidates[index].clone();
        let amount = self.trade_size(u_size);

        if u_dir < self.personality.buy_bias {
            return Decision::Buy { token, amount };
        }

        match holdings.holding(&token.address).await {
            Ok(holding) if holding > Decimal::ZERO => Decision::Sell {
                token,
                amount,
                holding,
            },
            Ok(_) => {
                debug!("No {} to sell", token.symbol);
                Decision::Skip {
                    reason: SkipReason::NoHolding,
                }
            }
            Err(e) => {
                warn!(address = %token.address, "Balance lookup failed, skipping sell: {}", e);
                Decision::Skip {
                    reason: SkipReason::NoHolding,
                }
            }
        }
    }

    /// Size for a uniform draw `u` in `[0, 1)`
    pub fn trade_size(&self, u: f64) -> Decimal {
        let min = self.personality.min_trade_amount;
        let max = self.personality.max_trade_amount;
        let factor = (self.personality.risk_tolerance * u).clamp(0.0, 1.0);
        let factor = Decimal::from_f64(factor).unwrap_or(Decimal::ZERO);

        let amount = (min + (max - min) * factor).round_dp(AMOUNT_DP);
        amount.clamp(min, max)
    }

    /// Uniform wait in whole seconds within `[min_interval, max_interval]`
    pub fn next_interval(&mut self) -> Duration {
        let lo = self.personality.min_interval;
        let hi = self.personality.max_interval.max(lo);
        Duration::from_secs(self.rng.gen_range(lo..=hi))
    }

    pub fn pick_phrase(&mut self, phrases: &[String], fallback: &str) -> String {
        phrases
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }
}
