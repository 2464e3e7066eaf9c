//! Bot Runner - per-bot trading loop
//!
//! One runner per personality. Each cycle walks
//! `Idle -> Selecting -> Deciding -> Submitting -> Confirming -> Reporting -> Idle`,
//! with `Backoff` between submission attempts and between failed receipt
//! lookups. Shutdown is checked between
//! states; a transaction that was broadcast is always reported.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::TokenCache;
use crate::config::BotConfig;
use crate::curve::{apply_slippage, verify_quote};
use crate::decision::{Decision, DecisionEngine, SkipReason};
use crate::executor::{ExecutionOutcome, Phase, TradeExecutor};
use crate::gateway::ChainGateway;
use crate::loader::TokenLoader;
use crate::notifier::{BotEvent, Notifier};
use crate::retry::RetryConfig;
use crate::types::{TradeSide, TradeTransaction, TradeableToken};

/// Cache extra field holding the last quoted virtual supply
pub const VIRTUAL_SUPPLY_KEY: &str = "virtual_supply";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Selecting,
    Deciding,
    Submitting,
    Backoff,
    Confirming,
    Reporting,
}

impl From<Phase> for LoopState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Submitting => LoopState::Submitting,
            Phase::Backoff => LoopState::Backoff,
            Phase::Confirming => LoopState::Confirming,
        }
    }
}

/// Why a decided trade was dropped before submission
#[derive(Debug, Clone, PartialEq)]
pub enum TradeAbort {
    InsufficientFunds { balance: Decimal, required: Decimal },
    QuoteFailed(String),
    PriceDeviation { local: Decimal, quoted: Decimal, deviation_bps: Decimal },
    CurveUndefined,
}

impl TradeAbort {
    pub fn code(&self) -> &'static str {
        match self {
            TradeAbort::InsufficientFunds { .. } => "insufficient_funds",
            TradeAbort::QuoteFailed(_) => "quote_failed",
            TradeAbort::PriceDeviation { .. } => "price_deviation",
            TradeAbort::CurveUndefined => "curve_undefined",
        }
    }

    fn message(&self) -> String {
        match self {
            TradeAbort::InsufficientFunds { balance, required } => {
                format!("Balance {} below required {}", balance, required)
            }
            TradeAbort::QuoteFailed(e) => format!("Quote failed: {}", e),
            TradeAbort::PriceDeviation {
                local,
                quoted,
                deviation_bps,
            } => format!(
                "Quote {} deviates {} bps from local estimate {}",
                quoted,
                deviation_bps.round_dp(1),
                local
            ),
            TradeAbort::CurveUndefined => "Curve estimate undefined for this trade".to_string(),
        }
    }
}

/// What one cycle ended with
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Aborted(TradeAbort),
    Executed(ExecutionOutcome),
    Interrupted,
}

enum Wake {
    Cycle,
    Heartbeat,
    Signal(bool),
}

#[derive(Debug, Clone)]
struct SessionMetrics {
    started_at: DateTime<Utc>,
    starting_balance: Option<Decimal>,
    confirmed: u32,
    failed: u32,
}

/// A transaction ready to submit plus what to say about it
struct PreparedTrade {
    tx: TradeTransaction,
    details: Map<String, Value>,
}

pub struct BotRunner {
    bot: BotConfig,
    gateway: Arc<dyn ChainGateway>,
    notifier: Arc<dyn Notifier>,
    loader: TokenLoader,
    cache: TokenCache,
    engine: DecisionEngine,
    executor: TradeExecutor,
    shutdown: watch::Receiver<bool>,
    state: LoopState,
    session: SessionMetrics,
    token_count: usize,
    /// Notifier deliveries still in flight
    deliveries: Vec<JoinHandle<()>>,
}

impl BotRunner {
    pub fn new(
        bot: BotConfig,
        gateway: Arc<dyn ChainGateway>,
        notifier: Arc<dyn Notifier>,
        mut cache: TokenCache,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        if bot.cache.force_refresh {
            cache.force_refresh();
        }

        let engine = DecisionEngine::new(&bot.name, bot.personality.clone(), bot.execution.creation_amount);
        let executor = TradeExecutor::new(
            gateway.clone(),
            RetryConfig::from(&bot.execution),
            Duration::from_secs(bot.execution.confirm_timeout_secs),
        );

        Self {
            loader: TokenLoader::new(gateway.clone()),
            bot,
            gateway,
            notifier,
            cache,
            engine,
            executor,
            shutdown,
            state: LoopState::Idle,
            session: SessionMetrics {
                started_at: Utc::now(),
                starting_balance: None,
                confirmed: 0,
                failed: 0,
            },
            token_count: 0,
            deliveries: Vec::new(),
        }
    }

    /// Replace the random source, e.g. with a seeded engine
    pub fn with_engine(mut self, engine: DecisionEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.executor = TradeExecutor::new(
            self.gateway.clone(),
            retry,
            Duration::from_secs(self.bot.execution.confirm_timeout_secs),
        );
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run until shutdown is signalled
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(
            "{} starting ({:?} mood, trades {}-{})",
            self.bot.display_name,
            self.bot.personality.mood(),
            self.bot.personality.min_trade_amount,
            self.bot.personality.max_trade_amount
        );
        self.session.starting_balance = self.gateway.native_balance().await.ok();
        self.cache.print_stats();
        self.send_heartbeat("startup").await;

        let mut heartbeat = interval(Duration::from_secs(self.bot.execution.heartbeat_interval_secs.max(1)));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        while !self.shutdown_requested() {
            let outcome = self.run_cycle().await;
            debug!("Cycle finished: {:?}", outcome);
            if outcome == CycleOutcome::Interrupted {
                break;
            }

            let wait = self.engine.next_interval();
            debug!("Next cycle in {:?}", wait);
            let pause = sleep(wait);
            tokio::pin!(pause);

            let stop = loop {
                let wake = tokio::select! {
                    _ = &mut pause => Wake::Cycle,
                    _ = heartbeat.tick() => Wake::Heartbeat,
                    changed = self.shutdown.changed() => Wake::Signal(changed.is_ok()),
                };
                match wake {
                    Wake::Cycle => break false,
                    Wake::Heartbeat => self.send_heartbeat("online").await,
                    // A dropped sender can never signal again
                    Wake::Signal(false) => break true,
                    Wake::Signal(true) if self.shutdown_requested() => break true,
                    Wake::Signal(true) => {}
                }
            };
            if stop {
                break;
            }
        }

        info!("{} shutting down", self.bot.display_name);
        if let Err(e) = self.cache.save() {
            warn!("Failed to save token cache on shutdown: {}", e);
        }
        self.send_heartbeat("shutdown").await;
        self.flush_reports().await;
        Ok(())
    }

    /// One pass through the state machine
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.state = LoopState::Selecting;
        let tokens = self.loader.load_tradeable_tokens(&mut self.cache).await;
        self.token_count = tokens.len();
        if self.shutdown_requested() {
            self.state = LoopState::Idle;
            return CycleOutcome::Interrupted;
        }

        self.state = LoopState::Deciding;
        let decision = self.engine.decide(&tokens, self.gateway.as_ref()).await;
        if let Decision::Skip { reason } = decision {
            debug!("Skipping cycle: {:?}", reason);
            self.state = LoopState::Idle;
            return CycleOutcome::Skipped(reason);
        }

        let prepared = match self.prepare(&decision).await {
            Ok(prepared) => prepared,
            Err(abort) => {
                warn!("{} aborted: {}", action_name(&decision), abort.message());
                self.state = LoopState::Reporting;
                self.report_abort(&decision, &abort);
                self.state = LoopState::Idle;
                return CycleOutcome::Aborted(abort);
            }
        };

        if self.shutdown_requested() {
            self.state = LoopState::Idle;
            return CycleOutcome::Interrupted;
        }

        let state = &mut self.state;
        let outcome = self
            .executor
            .execute(&prepared.tx, |phase| *state = phase.into())
            .await;

        self.state = LoopState::Reporting;
        if outcome.is_success() {
            self.session.confirmed += 1;
        } else {
            self.session.failed += 1;
        }
        self.report_outcome(&decision, prepared.details, &outcome);
        self.state = LoopState::Idle;

        CycleOutcome::Executed(outcome)
    }

    async fn prepare(&mut self, decision: &Decision) -> Result<PreparedTrade, TradeAbort> {
        let slippage_bps = self.bot.execution.max_slippage_bps;
        let prepared = match decision {
            Decision::Buy { token, amount } => {
                let expected_out = self.guarded_quote(token, TradeSide::Buy, *amount).await?;
                let min_tokens_out = apply_slippage(expected_out, slippage_bps);

                let mut details = token_details(token);
                details.insert("amount".into(), json!(amount.to_string()));
                details.insert("expectedTokens".into(), json!(expected_out.to_string()));

                PreparedTrade {
                    tx: TradeTransaction::Buy {
                        token: token.address.clone(),
                        native_amount: *amount,
                        min_tokens_out,
                    },
                    details,
                }
            }
            Decision::Sell { token, amount, holding } => {
                // Convert the native-denominated size into tokens at the live curve
                let sizing = self
                    .gateway
                    .estimate_trade(&token.address, TradeSide::Buy, *amount)
                    .await
                    .map_err(|e| TradeAbort::QuoteFailed(e.to_string()))?;
                let token_amount = sizing.expected_out.min(*holding);
                if token_amount <= Decimal::ZERO {
                    return Err(TradeAbort::QuoteFailed("zero token amount".to_string()));
                }

                let expected_out = self.guarded_quote(token, TradeSide::Sell, token_amount).await?;
                let min_native_out = apply_slippage(expected_out, slippage_bps);

                let mut details = token_details(token);
                details.insert("amount".into(), json!(expected_out.to_string()));
                details.insert("tokenAmount".into(), json!(token_amount.to_string()));
                details.insert("holding".into(), json!(holding.to_string()));

                PreparedTrade {
                    tx: TradeTransaction::Sell {
                        token: token.address.clone(),
                        token_amount,
                        min_native_out,
                    },
                    details,
                }
            }
            Decision::Create { concept, amount } => {
                let mut details = Map::new();
                details.insert("tokenName".into(), json!(concept.name));
                details.insert("tokenSymbol".into(), json!(concept.symbol));
                details.insert("imageEmoji".into(), json!(concept.image_emoji));
                details.insert("theme".into(), json!(concept.theme));
                details.insert("amount".into(), json!(amount.to_string()));

                PreparedTrade {
                    tx: TradeTransaction::Create {
                        name: concept.name.clone(),
                        symbol: concept.symbol.clone(),
                        image_url: concept.image_url(),
                        native_amount: *amount,
                    },
                    details,
                }
            }
            Decision::Skip { .. } => return Err(TradeAbort::CurveUndefined),
        };

        let value = prepared.tx.native_value();
        if value > Decimal::ZERO {
            self.ensure_funds(value).await?;
        }
        Ok(prepared)
    }

    /// Native balance must cover the amount. A failed balance read is not
    /// fatal; the node rejects the transaction if funds really are short.
    async fn ensure_funds(&self, required: Decimal) -> Result<(), TradeAbort> {
        match self.gateway.native_balance().await {
            Ok(balance) if balance < required => Err(TradeAbort::InsufficientFunds { balance, required }),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Balance check failed, continuing: {}", e);
                Ok(())
            }
        }
    }

    /// Quote on chain and check it against the local curve estimate.
    ///
    /// The local estimate uses the cached virtual supply when there is one,
    /// so a stale cache shows up as a deviation. The quoted supply is then
    /// written back to the cache.
    async fn guarded_quote(
        &mut self,
        token: &TradeableToken,
        side: TradeSide,
        amount: Decimal,
    ) -> Result<Decimal, TradeAbort> {
        let quote = self
            .gateway
            .estimate_trade(&token.address, side, amount)
            .await
            .map_err(|e| TradeAbort::QuoteFailed(e.to_string()))?;

        let cached_supply = self.cached_virtual_supply(&token.address);
        let mut extra = Map::new();
        extra.insert(VIRTUAL_SUPPLY_KEY.into(), json!(quote.virtual_supply.to_string()));
        self.cache.merge_extra(&token.address, extra);

        let supply = cached_supply.unwrap_or(quote.virtual_supply);
        let local = self
            .bot
            .curve
            .estimate(side, supply, amount)
            .ok_or(TradeAbort::CurveUndefined)?;

        verify_quote(local, quote.expected_out, self.bot.execution.price_tolerance_bps).map_err(
            |deviation_bps| TradeAbort::PriceDeviation {
                local,
                quoted: quote.expected_out,
                deviation_bps,
            },
        )?;

        Ok(quote.expected_out)
    }

    fn cached_virtual_supply(&self, address: &str) -> Option<Decimal> {
        let value = self.cache.peek(address)?.extra.get(VIRTUAL_SUPPLY_KEY)?;
        match value {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
            _ => None,
        }
    }

    fn report_outcome(&mut self, decision: &Decision, mut details: Map<String, Value>, outcome: &ExecutionOutcome) {
        let action = action_name(decision);
        let phrase = if outcome.is_success() {
            let (phrases, fallback) = match decision {
                Decision::Buy { .. } => (&self.bot.phrases.buy, "Buying"),
                Decision::Sell { .. } => (&self.bot.phrases.sell, "Selling"),
                _ => (&self.bot.phrases.create_token, "Creating a token"),
            };
            self.engine.pick_phrase(phrases, fallback)
        } else {
            self.engine.pick_phrase(&self.bot.phrases.error, "Trade failed")
        };

        details.insert("action".into(), json!(action));
        details.insert("status".into(), json!(outcome.status()));
        details.insert("success".into(), json!(outcome.is_success()));
        details.insert("attempts".into(), json!(outcome.attempts()));
        details.insert("txHash".into(), json!(outcome.tx_hash()));
        details.insert("phrase".into(), json!(phrase));

        match outcome {
            ExecutionOutcome::Confirmed { receipt, .. } | ExecutionOutcome::Reverted { receipt, .. } => {
                details.insert("gasUsed".into(), json!(receipt.gas_used));
                details.insert("blockNumber".into(), json!(receipt.block_number));
            }
            ExecutionOutcome::Unconfirmed { error, .. } => {
                details.insert("error".into(), json!(error));
            }
            ExecutionOutcome::SubmissionFailed { error, exhausted, .. } => {
                details.insert("error".into(), json!(error.to_string()));
                details.insert("retriesExhausted".into(), json!(exhausted));
            }
        }

        info!(
            "{} {} {} (attempts: {}, tx: {:?})",
            self.bot.display_name,
            action,
            outcome.status(),
            outcome.attempts(),
            outcome.tx_hash()
        );

        let event = if outcome.is_success() {
            BotEvent::trade(&self.bot.name, Value::Object(details))
        } else {
            BotEvent::error(&self.bot.name, Value::Object(details))
        };
        self.report(event);
    }

    fn report_abort(&mut self, decision: &Decision, abort: &TradeAbort) {
        let phrase = self.engine.pick_phrase(&self.bot.phrases.error, "Trade skipped");
        let mut details = match decision {
            Decision::Buy { token, .. } | Decision::Sell { token, .. } => token_details(token),
            _ => Map::new(),
        };
        details.insert("action".into(), json!(action_name(decision)));
        details.insert("status".into(), json!("aborted"));
        details.insert("reason".into(), json!(abort.code()));
        details.insert("error".into(), json!(abort.message()));
        details.insert("phrase".into(), json!(phrase));

        self.report(BotEvent::error(&self.bot.name, Value::Object(details)));
    }

    async fn send_heartbeat(&mut self, status: &str) {
        let balance = self.gateway.native_balance().await.ok();
        let pnl = match (balance, self.session.starting_balance) {
            (Some(now), Some(start)) => Some(now - start),
            _ => None,
        };
        let pnl_percent = match (pnl, self.session.starting_balance) {
            (Some(pnl), Some(start)) if !start.is_zero() => Some((pnl / start * Decimal::ONE_HUNDRED).round_dp(2)),
            _ => None,
        };
        let low_balance = balance.map(|b| b < self.bot.personality.low_balance_threshold());
        if low_balance == Some(true) {
            warn!("{} balance is running low: {:?}", self.bot.display_name, balance);
        }

        let payload = json!({
            "status": status,
            "mood": self.bot.personality.mood(),
            "walletAddress": self.gateway.wallet_address(),
            "tokenCount": self.token_count,
            "balance": balance.map(|b| b.to_string()),
            "startingBalance": self.session.starting_balance.map(|b| b.to_string()),
            "pnl": pnl.map(|p| p.to_string()),
            "pnlPercent": pnl_percent.map(|p| p.to_string()),
            "lowBalance": low_balance,
            "tradesConfirmed": self.session.confirmed,
            "tradesFailed": self.session.failed,
            "sessionMinutes": (Utc::now() - self.session.started_at).num_minutes(),
            "cache": self.cache.get_stats(),
        });

        self.report(BotEvent::heartbeat(&self.bot.name, payload));
    }

    /// Deliver an event within the notify timeout; failures are only logged
    /// Hand an event to the notifier without holding up the loop. Each
    /// delivery is bounded by `notify_timeout_secs`; failures are logged.
    fn report(&mut self, event: BotEvent) {
        let limit = Duration::from_secs(self.bot.execution.notify_timeout_secs.max(1));
        let notifier = self.notifier.clone();

        self.deliveries.retain(|handle| !handle.is_finished());
        self.deliveries.push(tokio::spawn(async move {
            match timeout(limit, notifier.notify(&event)).await {
                Ok(Ok(())) => debug!("Reported {:?} event {}", event.kind, event.event_id),
                Ok(Err(e)) => warn!("Failed to report {:?} event: {}", event.kind, e),
                Err(_) => warn!("Reporting {:?} event timed out after {:?}", event.kind, limit),
            }
        }));
    }

    /// Wait for every in-flight notifier delivery
    pub async fn flush_reports(&mut self) {
        for handle in self.deliveries.drain(..) {
            if let Err(e) = handle.await {
                warn!("Report delivery task failed: {}", e);
            }
        }
    }
}

fn action_name(decision: &Decision) -> &'static str {
    match decision {
        Decision::Buy { .. } => "buy",
        Decision::Sell { .. } => "sell",
        Decision::Create { .. } => "create_token",
        Decision::Skip { .. } => "skip",
    }
}

fn token_details(token: &TradeableToken) -> Map<String, Value> {
    let mut details = Map::new();
    details.insert("tokenAddress".into(), json!(token.address));
    details.insert("tokenName".into(), json!(token.name));
    details.insert("tokenSymbol".into(), json!(token.symbol));
    details
}
