//! Per-route sliding-window rate limiting.
//!
//! Each configured route owns one limiter; a request acquires a slot before
//! any upstream work happens. Rejections surface as
//! [`GatewayError::RateLimitExceeded`](crate::models::error::GatewayError)
//! and map to HTTP 429 with a `Retry-After` hint at the edge.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Rate limiting algorithm selector.
///
/// Only the sliding window is implemented; the enum keeps the configuration
/// surface explicit about which algorithm a route runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitStrategy {
    /// Continuous window over the most recent `window_ms`
    SlidingWindow,
}

impl Default for RateLimitStrategy {
    fn default() -> Self {
        Self::SlidingWindow
    }
}

/// Rate limiter configuration attached to a route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Algorithm to apply
    #[serde(default)]
    pub strategy: RateLimitStrategy,

    /// Maximum requests admitted per window
    pub max: u64,

    /// Window length in milliseconds
    #[serde(rename = "window")]
    pub window_ms: u64,
}

/// Sliding-window request limiter.
///
/// Admission timestamps are retained for one window; a request is admitted
/// while fewer than `max` timestamps fall inside the window. The limiter
/// therefore admits at most `max` requests within *any* interval of the
/// window length, not just aligned buckets.
#[derive(Debug)]
pub struct RateLimiter {
    max: u64,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Builds a limiter from route configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max: config.max,
            window: Duration::from_millis(config.window_ms),
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    /// Attempts to admit one request.
    ///
    /// Returns `false` without recording anything when the window is full.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut admitted = self.admitted.lock().unwrap();

        while let Some(oldest) = admitted.front() {
            if now.duration_since(*oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if (admitted.len() as u64) < self.max {
            admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Milliseconds until the oldest retained admission leaves the window.
    ///
    /// Zero when the window currently has free capacity.
    pub fn retry_after_ms(&self) -> u64 {
        let now = Instant::now();
        let admitted = self.admitted.lock().unwrap();

        if (admitted.len() as u64) < self.max {
            return 0;
        }

        admitted
            .front()
            .map(|oldest| {
                self.window
                    .saturating_sub(now.duration_since(*oldest))
                    .as_millis() as u64
            })
            .unwrap_or(0)
    }
}
