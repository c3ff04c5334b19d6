//! Bounded exponential backoff for download attempts

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for retryable network failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay added as random jitter (0.0 disables)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Policy with no delay between attempts, for tests and scripted runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }
}

/// Delay to wait after the `attempt`-th failure (1-based)
pub fn calculate_backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32) as i32;
    let base = config.initial_delay_ms as f64 * config.multiplier.max(1.0).powi(exponent);
    let capped = base.min(config.max_delay_ms as f64);
    let jitter = if config.jitter > 0.0 {
        capped * config.jitter * fastrand::f64()
    } else {
        0.0
    };
    Duration::from_millis((capped + jitter) as u64)
}
