//! Bounded exponential backoff

use std::time::Duration;

use crate::config::ExecutionConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, first try included
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
            jitter: true,
        }
    }
}

impl From<&ExecutionConfig> for RetryConfig {
    fn from(exec: &ExecutionConfig) -> Self {
        Self {
            max_attempts: exec.max_attempts.max(1),
            base_delay_ms: exec.base_delay_ms,
            max_delay_ms: exec.max_delay_ms,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts; for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        }
    }
}

/// Delay before retry number `attempt` (0-based): base, 2x, 4x, 8x, capped
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let delay = config.base_delay_ms.saturating_mul(1_u64 << attempt.min(3));
    let delay = delay.min(config.max_delay_ms);

    // ±25%
    let jittered = if config.jitter && delay > 0 {
        let jitter_range = delay / 4;
        let jitter = rand::random::<u64>() % (jitter_range * 2 + 1);
        delay.saturating_sub(jitter_range) + jitter
    } else {
        delay
    };

    Duration::from_millis(jittered)
}
