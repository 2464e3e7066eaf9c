//! End-to-end trading loop test harness
//!
//! Drives whole cycles through the runner:
//! discover → decide → price guard → submit (with retry) → confirm → report


use mock_gateway::{MockGateway, MockToken, RecordingNotifier};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use volume_bot::{
    cache::TokenCache,
    config::{BotConfig, CacheConfig, ExecutionConfig, Personality, Phrases},
    curve::BondingCurve,
    decision::{DecisionEngine, SkipReason},
    error::GatewayError,
    executor::{ExecutionOutcome, Phase, TradeExecutor},
    gateway::ChainGateway,
    notifier::EventKind,
    retry::RetryConfig,
    runner::{BotRunner, CycleOutcome, LoopState, TradeAbort, VIRTUAL_SUPPLY_KEY},
    types::TradeTransaction,
};

const TOKEN: &str = "0xaaa1";

fn personality(buy_bias: f64, create_token_chance: f64) -> Personality {
    Personality {
        buy_bias,
        risk_tolerance: 0.5,
        min_trade_amount: Decimal::new(5, 3),
        max_trade_amount: Decimal::new(2, 2),
        min_interval: 1,
        max_interval: 1,
        create_token_chance,
    }
}

fn test_bot(personality: Personality) -> BotConfig {
    BotConfig {
        name: "test_bot".to_string(),
        display_name: "Test Bot".to_string(),
        avatar_url: "/test.png".to_string(),
        bio: None,
        personality,
        phrases: Phrases::default(),
        cache: CacheConfig::default(),
        execution: ExecutionConfig::default(),
        curve: BondingCurve::default(),
        private_key: None,
    }
}

struct Harness {
    gateway: MockGateway,
    notifier: RecordingNotifier,
    shutdown: watch::Sender<bool>,
    _dir: TempDir,
}

fn harness_with(personality: Personality, notifier: RecordingNotifier) -> (Harness, BotRunner) {
    let dir = TempDir::new().unwrap();
    let gateway = MockGateway::new().with_tokens(vec![MockToken::trading(TOKEN, "AAA")]);
    let (tx, rx) = watch::channel(false);

    let bot = test_bot(personality.clone());
    let cache = TokenCache::load(dir.path(), &bot.name, bot.cache.cache_duration_hours);
    let engine = DecisionEngine::from_seed(&bot.name, personality, bot.execution.creation_amount, 7);
    let runner = BotRunner::new(
        bot,
        Arc::new(gateway.clone()),
        Arc::new(notifier.clone()),
        cache,
        rx,
    )
    .with_engine(engine)
    .with_retry(RetryConfig::immediate(3));

    (
        Harness {
            gateway,
            notifier,
            shutdown: tx,
            _dir: dir,
        },
        runner,
    )
}

fn harness(personality: Personality) -> (Harness, BotRunner) {
    harness_with(personality, RecordingNotifier::new())
}

/// Run one cycle and wait for its events to reach the notifier
async fn cycle(runner: &mut BotRunner) -> CycleOutcome {
    let outcome = runner.run_cycle().await;
    runner.flush_reports().await;
    outcome
}

#[tokio::test]
async fn test_buy_cycle_confirms_and_reports_once() {
    let (h, mut runner) = harness(personality(1.0, 0.0));

    let outcome = cycle(&mut runner).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Executed(ExecutionOutcome::Confirmed { attempts: 1, .. })
    ));
    assert_eq!(runner.state(), LoopState::Idle);

    let submitted = h.gateway.submitted();
    assert_eq!(submitted.len(), 1);
    match &submitted[0] {
        TradeTransaction::Buy {
            token,
            native_amount,
            min_tokens_out,
        } => {
            assert_eq!(token, TOKEN);
            assert!(*native_amount >= Decimal::new(5, 3) && *native_amount <= Decimal::new(2, 2));
            assert!(*min_tokens_out > Decimal::ZERO);
        }
        other => panic!("expected buy, got {:?}", other),
    }

    let events = h.notifier.outcome_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Trade);
    assert_eq!(events[0].payload["action"], json!("buy"));
    assert_eq!(events[0].payload["status"], json!("confirmed"));
    assert_eq!(events[0].payload["tokenSymbol"], json!("AAA"));
    assert!(events[0].payload["txHash"].is_string());
    assert_eq!(events[0].payload["gasUsed"], json!(150_000));
}

#[tokio::test]
async fn test_buy_applies_slippage_floor() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    cycle(&mut runner).await;

    let TradeTransaction::Buy {
        native_amount,
        min_tokens_out,
        ..
    } = h.gateway.submitted()[0].clone()
    else {
        panic!("expected buy");
    };

    let expected = BondingCurve::default()
        .tokens_for_native(Decimal::from(1_000_000), native_amount)
        .unwrap();
    // 500 bps default slippage
    assert_eq!(min_tokens_out, expected * Decimal::new(95, 2));
}

#[tokio::test]
async fn test_quoted_supply_is_cached() {
    let (_h, mut runner) = harness(personality(1.0, 0.0));
    cycle(&mut runner).await;

    let cached = runner.cache().peek(TOKEN).unwrap();
    assert_eq!(cached.extra[VIRTUAL_SUPPLY_KEY], json!("1000000"));
    assert_eq!(cached.symbol, "AAA");
}

#[tokio::test]
async fn test_transient_failures_exhaust_retry_cap() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.gateway.queue_submit_errors(vec![
        GatewayError::Transport("connection reset".to_string()),
        GatewayError::NonceConflict("nonce too low".to_string()),
        GatewayError::Underpriced("replacement transaction underpriced".to_string()),
    ]);

    let outcome = cycle(&mut runner).await;

    match outcome {
        CycleOutcome::Executed(ExecutionOutcome::SubmissionFailed {
            attempts, exhausted, ..
        }) => {
            assert_eq!(attempts, 3);
            assert!(exhausted);
        }
        other => panic!("expected submission failure, got {:?}", other),
    }
    let counts = h.gateway.counts();
    assert_eq!(counts.submit, 3, "no fourth attempt");
    assert_eq!(counts.receipt, 0);

    let events = h.notifier.outcome_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Error);
    assert_eq!(events[0].payload["status"], json!("submission_failed"));
    assert_eq!(events[0].payload["attempts"], json!(3));
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.gateway
        .queue_submit_errors(vec![GatewayError::Transport("503 Service Unavailable".to_string())]);

    let outcome = cycle(&mut runner).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Executed(ExecutionOutcome::Confirmed { attempts: 2, .. })
    ));
    assert_eq!(h.gateway.counts().submit, 2);
    assert_eq!(h.notifier.outcome_events()[0].kind, EventKind::Trade);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.gateway.queue_submit_errors(vec![GatewayError::InsufficientFunds(
        "insufficient funds for gas * price + value".to_string(),
    )]);

    let outcome = cycle(&mut runner).await;

    match outcome {
        CycleOutcome::Executed(ExecutionOutcome::SubmissionFailed {
            attempts, exhausted, ..
        }) => {
            assert_eq!(attempts, 1);
            assert!(!exhausted);
        }
        other => panic!("expected submission failure, got {:?}", other),
    }
    assert_eq!(h.gateway.counts().submit, 1);
    assert_eq!(h.notifier.outcome_events().len(), 1);
}

#[tokio::test]
async fn test_revert_reported_once_without_retry() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.gateway.set_receipt(Some(false));

    let outcome = cycle(&mut runner).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Executed(ExecutionOutcome::Reverted { .. })
    ));
    assert_eq!(h.gateway.counts().submit, 1);

    let events = h.notifier.outcome_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Error);
    assert_eq!(events[0].payload["status"], json!("reverted"));
    assert_eq!(events[0].payload["blockNumber"], json!(42));
}

#[tokio::test]
async fn test_missing_receipt_is_unconfirmed() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.gateway.set_receipt(None);

    let outcome = cycle(&mut runner).await;

    match outcome {
        CycleOutcome::Executed(ExecutionOutcome::Unconfirmed { ref tx_hash, .. }) => {
            assert!(tx_hash.starts_with("0x"));
        }
        other => panic!("expected unconfirmed, got {:?}", other),
    }
    let events = h.notifier.outcome_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["status"], json!("unconfirmed"));
    assert!(events[0].payload["txHash"].is_string());
}

#[tokio::test]
async fn test_receipt_lookup_error_backs_off_and_confirms() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.gateway
        .queue_receipt_errors(vec![GatewayError::Transport("connection reset".to_string())]);

    let outcome = cycle(&mut runner).await;

    match outcome {
        CycleOutcome::Executed(ExecutionOutcome::Confirmed { attempts, .. }) => assert_eq!(attempts, 1),
        other => panic!("expected confirmed, got {:?}", other),
    }
    let counts = h.gateway.counts();
    assert_eq!(counts.submit, 1);
    assert_eq!(counts.receipt, 2);

    let events = h.notifier.outcome_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["status"], json!("confirmed"));
}

#[tokio::test]
async fn test_confirmation_passes_through_backoff() {
    let gateway = MockGateway::new().with_tokens(vec![MockToken::trading(TOKEN, "AAA")]);
    gateway.queue_receipt_errors(vec![
        GatewayError::Transport("connection reset".to_string()),
        GatewayError::NonceConflict("nonce too low".to_string()),
    ]);
    let chain: Arc<dyn ChainGateway> = Arc::new(gateway.clone());
    let executor = TradeExecutor::new(chain, RetryConfig::immediate(3), Duration::from_secs(5));
    let tx = TradeTransaction::Buy {
        token: TOKEN.to_string(),
        native_amount: Decimal::new(1, 2),
        min_tokens_out: Decimal::ONE,
    };

    let mut phases = Vec::new();
    let outcome = executor.execute(&tx, |phase| phases.push(phase)).await;

    assert!(outcome.is_success());
    assert_eq!(
        phases,
        vec![
            Phase::Submitting,
            Phase::Confirming,
            Phase::Backoff,
            Phase::Confirming,
            Phase::Backoff,
            Phase::Confirming,
        ]
    );
    assert_eq!(gateway.counts().receipt, 3);
}

#[tokio::test]
async fn test_permanent_receipt_error_is_unconfirmed() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.gateway
        .queue_receipt_errors(vec![GatewayError::InvalidResponse("malformed receipt".to_string())]);

    let outcome = cycle(&mut runner).await;

    match outcome {
        CycleOutcome::Executed(ExecutionOutcome::Unconfirmed { ref error, .. }) => {
            assert!(error.as_deref().unwrap().contains("malformed receipt"));
        }
        other => panic!("expected unconfirmed, got {:?}", other),
    }
    assert_eq!(h.gateway.counts().receipt, 1);
    assert_eq!(h.notifier.outcome_events()[0].payload["status"], json!("unconfirmed"));
}

#[tokio::test]
async fn test_skewed_quote_aborts_before_submission() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.gateway.set_quote_skew(Decimal::new(11, 1));

    let outcome = cycle(&mut runner).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Aborted(TradeAbort::PriceDeviation { .. })
    ));
    assert_eq!(h.gateway.counts().submit, 0);

    let events = h.notifier.outcome_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Error);
    assert_eq!(events[0].payload["reason"], json!("price_deviation"));
}

#[tokio::test]
async fn test_supply_moved_since_cached_aborts() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    cycle(&mut runner).await;
    assert_eq!(h.gateway.submitted().len(), 1);

    // Curve moved far from what the cache last saw
    h.gateway.set_supply(TOKEN, Decimal::from(500_000_000));
    let outcome = cycle(&mut runner).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Aborted(TradeAbort::PriceDeviation { .. })
    ));
    assert_eq!(h.gateway.submitted().len(), 1);

    // The guard refreshed the cached supply, so the next cycle trades again
    let outcome = cycle(&mut runner).await;
    assert!(matches!(
        outcome,
        CycleOutcome::Executed(ExecutionOutcome::Confirmed { .. })
    ));
}

#[tokio::test]
async fn test_low_balance_blocks_buy() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.gateway.set_native_balance(Decimal::new(1, 3));

    let outcome = cycle(&mut runner).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Aborted(TradeAbort::InsufficientFunds { .. })
    ));
    assert_eq!(h.gateway.counts().submit, 0);
    assert_eq!(h.notifier.outcome_events()[0].payload["reason"], json!("insufficient_funds"));
}

#[tokio::test]
async fn test_low_balance_does_not_block_sell() {
    let (h, mut runner) = harness(personality(0.0, 0.0));
    h.gateway.set_token_balance(TOKEN, Decimal::from(10));
    h.gateway.set_native_balance(Decimal::ZERO);

    let outcome = cycle(&mut runner).await;

    // A sell sends no native value, so an empty wallet still trades
    assert!(matches!(
        outcome,
        CycleOutcome::Executed(ExecutionOutcome::Confirmed { .. })
    ));
    assert!(matches!(h.gateway.submitted()[0], TradeTransaction::Sell { .. }));
}

#[tokio::test]
async fn test_sell_is_capped_by_holding() {
    let (h, mut runner) = harness(personality(0.0, 0.0));
    h.gateway.set_token_balance(TOKEN, Decimal::from(10));

    let outcome = cycle(&mut runner).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Executed(ExecutionOutcome::Confirmed { .. })
    ));
    match &h.gateway.submitted()[0] {
        TradeTransaction::Sell {
            token_amount,
            min_native_out,
            ..
        } => {
            assert_eq!(*token_amount, Decimal::from(10));
            assert!(*min_native_out > Decimal::ZERO);
        }
        other => panic!("expected sell, got {:?}", other),
    }
    assert_eq!(h.notifier.outcome_events()[0].payload["action"], json!("sell"));
}

#[tokio::test]
async fn test_sell_without_holding_skips_silently() {
    let (h, mut runner) = harness(personality(0.0, 0.0));

    let outcome = cycle(&mut runner).await;

    assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::NoHolding));
    assert_eq!(h.gateway.counts().submit, 0);
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn test_no_tokens_skips_silently() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.gateway.remove_token(TOKEN);

    let outcome = cycle(&mut runner).await;

    assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::NoCandidates));
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn test_create_submits_new_token() {
    let (h, mut runner) = harness(personality(0.5, 1.0));

    let outcome = cycle(&mut runner).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Executed(ExecutionOutcome::Confirmed { .. })
    ));
    match &h.gateway.submitted()[0] {
        TradeTransaction::Create {
            name,
            symbol,
            image_url,
            native_amount,
        } => {
            assert!(!name.is_empty());
            assert!((3..=5).contains(&symbol.len()));
            assert!(image_url.starts_with("data:text/plain"));
            assert_eq!(*native_amount, ExecutionConfig::default().creation_amount);
        }
        other => panic!("expected create, got {:?}", other),
    }
    assert_eq!(h.notifier.outcome_events()[0].payload["action"], json!("create_token"));
}

#[tokio::test]
async fn test_notifier_failure_does_not_stop_the_loop() {
    let (h, mut runner) = harness_with(personality(1.0, 0.0), RecordingNotifier::failing());

    let first = cycle(&mut runner).await;
    let second = cycle(&mut runner).await;

    assert!(matches!(first, CycleOutcome::Executed(ExecutionOutcome::Confirmed { .. })));
    assert!(matches!(second, CycleOutcome::Executed(ExecutionOutcome::Confirmed { .. })));
    assert_eq!(h.notifier.outcome_events().len(), 2);
}

#[tokio::test]
async fn test_slow_notifier_does_not_delay_cycle() {
    let (h, mut runner) = harness_with(
        personality(1.0, 0.0),
        RecordingNotifier::slow(Duration::from_secs(10)),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(2), runner.run_cycle())
        .await
        .expect("cycle waited on the notifier");

    assert!(matches!(
        outcome,
        CycleOutcome::Executed(ExecutionOutcome::Confirmed { .. })
    ));
    assert_eq!(runner.state(), LoopState::Idle);
    assert!(h.notifier.outcome_events().is_empty());
}

#[tokio::test]
async fn test_shutdown_before_submission_interrupts() {
    let (h, mut runner) = harness(personality(1.0, 0.0));
    h.shutdown.send(true).unwrap();

    let outcome = cycle(&mut runner).await;

    assert_eq!(outcome, CycleOutcome::Interrupted);
    assert_eq!(h.gateway.counts().submit, 0);
}

#[tokio::test]
async fn test_run_saves_cache_and_reports_lifecycle() {
    let (h, runner) = harness(personality(1.0, 0.0));
    let cache_path = runner.cache().path().to_path_buf();

    let task = tokio::spawn(runner.run());

    // Wait for the first trade, then stop during the inter-cycle pause
    let mut waited = 0;
    while h.notifier.outcome_events().is_empty() && waited < 200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    h.shutdown.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("runner did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert!(cache_path.exists());

    let statuses: Vec<_> = h
        .notifier
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::Heartbeat)
        .map(|e| e.payload["status"].clone())
        .collect();
    assert_eq!(statuses.first(), Some(&json!("startup")));
    assert_eq!(statuses.last(), Some(&json!("shutdown")));

    let reloaded = TokenCache::load(cache_path.parent().unwrap(), "test_bot", 6.0);
    assert!(reloaded.peek(TOKEN).is_some());
}
