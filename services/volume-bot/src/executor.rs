//! Trade Executor - submit with bounded retry, then confirm

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::gateway::ChainGateway;
use crate::retry::{backoff_delay, RetryConfig};
use crate::types::{Receipt, TradeTransaction};

/// Where an execution currently is; reported to the caller as it moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Submitting,
    Backoff,
    Confirming,
}

/// Terminal result of one execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Mined with success status
    Confirmed {
        tx_hash: String,
        receipt: Receipt,
        attempts: u32,
    },
    /// Mined but reverted; never retried
    Reverted {
        tx_hash: String,
        receipt: Receipt,
        attempts: u32,
    },
    /// Broadcast, but no receipt within the confirmation window.
    /// The transaction may still land.
    Unconfirmed {
        tx_hash: String,
        attempts: u32,
        error: Option<String>,
    },
    /// Never broadcast. `exhausted` is set when the attempt cap ran out on
    /// transient errors, clear when a permanent error stopped it early.
    SubmissionFailed {
        error: GatewayError,
        attempts: u32,
        exhausted: bool,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Confirmed { .. })
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Confirmed { tx_hash, .. }
            | ExecutionOutcome::Reverted { tx_hash, .. }
            | ExecutionOutcome::Unconfirmed { tx_hash, .. } => Some(tx_hash),
            ExecutionOutcome::SubmissionFailed { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ExecutionOutcome::Confirmed { attempts, .. }
            | ExecutionOutcome::Reverted { attempts, .. }
            | ExecutionOutcome::Unconfirmed { attempts, .. }
            | ExecutionOutcome::SubmissionFailed { attempts, .. } => *attempts,
        }
    }

    /// Stable label for reported events
    pub fn status(&self) -> &'static str {
        match self {
            ExecutionOutcome::Confirmed { .. } => "confirmed",
            ExecutionOutcome::Reverted { .. } => "reverted",
            ExecutionOutcome::Unconfirmed { .. } => "unconfirmed",
            ExecutionOutcome::SubmissionFailed { .. } => "submission_failed",
        }
    }
}

pub struct TradeExecutor {
    gateway: Arc<dyn ChainGateway>,
    retry: RetryConfig,
    confirm_timeout: Duration,
}

impl TradeExecutor {
    pub fn new(gateway: Arc<dyn ChainGateway>, retry: RetryConfig, confirm_timeout: Duration) -> Self {
        Self {
            gateway,
            retry,
            confirm_timeout,
        }
    }

    /// Submit, then confirm. `on_phase` is called on every transition.
    pub async fn execute<F>(&self, tx: &TradeTransaction, mut on_phase: F) -> ExecutionOutcome
    where
        F: FnMut(Phase) + Send,
    {
        let (tx_hash, attempts) = match self.submit(tx, &mut on_phase).await {
            Ok(submitted) => submitted,
            Err(outcome) => return outcome,
        };
        on_phase(Phase::Confirming);
        self.confirm(tx_hash, attempts, &mut on_phase).await
    }

    async fn submit<F>(&self, tx: &TradeTransaction, on_phase: &mut F) -> Result<(String, u32), ExecutionOutcome>
    where
        F: FnMut(Phase) + Send,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            on_phase(Phase::Submitting);
            match self.gateway.submit_transaction(tx).await {
                Ok(tx_hash) => {
                    info!("{} submitted: {} (attempt {})", tx.kind(), tx_hash, attempt);
                    return Ok((tx_hash, attempt));
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = backoff_delay(attempt - 1, &self.retry);
                    warn!(
                        "{} submission failed (attempt {}/{}), retrying in {:?}: {}",
                        tx.kind(),
                        attempt,
                        max_attempts,
                        delay,
                        e
                    );
                    on_phase(Phase::Backoff);
                    sleep(delay).await;
                }
                Err(e) => {
                    let exhausted = e.is_transient();
                    warn!(
                        "{} submission gave up after {} attempt(s): {}",
                        tx.kind(),
                        attempt,
                        e
                    );
                    return Err(ExecutionOutcome::SubmissionFailed {
                        error: e,
                        attempts: attempt,
                        exhausted,
                    });
                }
            }
        }
    }

    /// Poll for the receipt until `confirm_timeout` runs out. Transient
    /// lookup errors back off and poll again; only a permanent error or the
    /// deadline leaves the outcome unknown.
    async fn confirm<F>(&self, tx_hash: String, attempts: u32, on_phase: &mut F) -> ExecutionOutcome
    where
        F: FnMut(Phase) + Send,
    {
        debug!("Waiting up to {:?} for {}", self.confirm_timeout, tx_hash);
        let deadline = Instant::now() + self.confirm_timeout;
        let mut lookup_failures = 0;
        let mut last_error = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match timeout(remaining, self.gateway.get_receipt(&tx_hash, remaining)).await {
                Ok(Ok(Some(receipt))) if receipt.success => {
                    return ExecutionOutcome::Confirmed {
                        tx_hash,
                        receipt,
                        attempts,
                    }
                }
                Ok(Ok(Some(receipt))) => {
                    warn!("Transaction {} reverted", tx_hash);
                    return ExecutionOutcome::Reverted {
                        tx_hash,
                        receipt,
                        attempts,
                    };
                }
                Ok(Ok(None)) | Err(_) => break,
                Ok(Err(e)) if e.is_transient() => {
                    let delay = backoff_delay(lookup_failures, &self.retry)
                        .min(deadline.saturating_duration_since(Instant::now()));
                    lookup_failures += 1;
                    warn!("Receipt lookup for {} failed, retrying in {:?}: {}", tx_hash, delay, e);
                    last_error = Some(e.to_string());
                    on_phase(Phase::Backoff);
                    sleep(delay).await;
                    on_phase(Phase::Confirming);
                }
                Ok(Err(e)) => {
                    warn!("Receipt lookup for {} failed: {}", tx_hash, e);
                    return ExecutionOutcome::Unconfirmed {
                        tx_hash,
                        attempts,
                        error: Some(e.to_string()),
                    };
                }
            }
        }

        warn!("No receipt for {} within {:?}", tx_hash, self.confirm_timeout);
        ExecutionOutcome::Unconfirmed {
            tx_hash,
            attempts,
            error: last_error,
        }
    }
}
