//! Retry policy with exponential backoff for transient upstream failures.
//!
//! The policy re-attempts transport errors, timeouts, and retryable 5xx
//! responses. It runs *inside* the circuit breaker, so the breaker observes
//! a whole retry sequence as a single outcome, and the route's overall
//! deadline bounds every attempt.

use crate::models::error::GatewayError;
use crate::models::http::GatewayResponse;
use log::warn;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::{sleep, Duration};

/// Retry configuration for handling transient failures.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds (default: 100ms)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Cap applied to the exponential delay (default: 5000ms)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Whether to randomize delays to avoid thundering herds (default: true)
    #[serde(default = "default_jitter")]
    pub jitter: bool,

    /// Upstream status codes treated as retryable failures
    #[serde(default = "default_retry_on_status_codes")]
    pub retry_on_status_codes: Vec<u16>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_jitter() -> bool {
    true
}

fn default_retry_on_status_codes() -> Vec<u16> {
    vec![500, 502, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: default_jitter(),
            retry_on_status_codes: default_retry_on_status_codes(),
        }
    }
}

impl RetryConfig {
    /// Validates retry configuration bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.max_attempts > 10 {
            return Err("max_attempts should not exceed 10 to prevent excessive delays".to_string());
        }
        if self.backoff_ms > self.max_backoff_ms {
            return Err("backoff_ms cannot be greater than max_backoff_ms".to_string());
        }
        Ok(())
    }

    /// Exponential delay for the n-th attempt (1-indexed): `backoff_ms *
    /// 2^(n-1)` capped at `max_backoff_ms`. Jitter is applied separately.
    pub fn calculate_backoff(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self.backoff_ms.saturating_mul(1u64 << exponent);
        delay.min(self.max_backoff_ms)
    }

    /// Whether an upstream status code should trigger another attempt.
    pub fn retries_status(&self, status: u16) -> bool {
        self.retry_on_status_codes.contains(&status)
    }
}

/// Executes upstream calls under a [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Builds a policy from configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Runs `operation` until it yields a non-retryable outcome or the
    /// attempt budget is exhausted.
    ///
    /// Retryable outcomes are transport errors, timeouts, and responses
    /// whose status appears in `retry_on_status_codes`. On exhaustion the
    /// final outcome is surfaced unchanged: a last 5xx response is still
    /// forwarded verbatim, never converted into a gateway error.
    pub async fn execute<Op, Fut>(&self, mut operation: Op) -> Result<GatewayResponse, GatewayError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<GatewayResponse, GatewayError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let outcome = operation().await;

            let retryable = match &outcome {
                Ok(response) => self.config.retries_status(response.status),
                Err(error) => error.is_retryable(),
            };

            if !retryable || attempt == max_attempts {
                return outcome;
            }

            let delay = self.delay_for(attempt);
            match &outcome {
                Ok(response) => warn!(
                    "Retryable status {} on attempt {}/{}, backing off {}ms",
                    response.status, attempt, max_attempts, delay
                ),
                Err(error) => warn!(
                    "Retryable error on attempt {}/{}: {}, backing off {}ms",
                    attempt, max_attempts, error, delay
                ),
            }

            sleep(Duration::from_millis(delay)).await;
        }

        unreachable!("retry loop returns on final attempt")
    }

    fn delay_for(&self, attempt: u32) -> u64 {
        let base = self.config.calculate_backoff(attempt);
        if self.config.jitter && base > 1 {
            use rand::Rng;
            // Equal-jitter: half deterministic, half random
            let half = base / 2;
            half + rand::thread_rng().gen_range(0..=half)
        } else {
            base
        }
    }
}
