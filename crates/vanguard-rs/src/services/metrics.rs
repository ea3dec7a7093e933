//! Sliding-window call metrics with latency percentiles.
//!
//! Each collector retains raw observations for a bounded time window and
//! derives counters, failure rate, and latency percentiles from whatever is
//! currently retained. Entries older than the window are evicted on every
//! read and write, so snapshots never include stale traffic.

use log::debug;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default observation window when none is configured.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Read-only view over the collector's current window.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    /// Calls observed within the window
    pub total_calls: u64,
    /// Calls recorded as successes
    pub success_calls: u64,
    /// Calls recorded as failures
    pub failure_calls: u64,
    /// Failures as a percentage of total calls (0 when idle)
    pub failure_rate: f64,
    /// Mean duration in milliseconds
    pub average_response_time: f64,
    /// Median duration in milliseconds
    pub p50: u64,
    /// 95th percentile duration in milliseconds
    pub p95: u64,
    /// 99th percentile duration in milliseconds
    pub p99: u64,
    /// Fastest observed duration in milliseconds
    pub min: u64,
    /// Slowest observed duration in milliseconds
    pub max: u64,
}

impl MetricsSnapshot {
    fn empty() -> Self {
        Self {
            total_calls: 0,
            success_calls: 0,
            failure_calls: 0,
            failure_rate: 0.0,
            average_response_time: 0.0,
            p50: 0,
            p95: 0,
            p99: 0,
            min: 0,
            max: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    at: Instant,
    success: bool,
    duration_ms: u64,
}

/// Thread-safe sliding-window metrics collector.
///
/// Cloning is cheap and every clone shares the same window, so a collector
/// can be handed to request handlers and evaluation tasks alike. All
/// methods take `&self` and serialize access on an internal mutex.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    window: Duration,
    observations: Mutex<VecDeque<Observation>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl MetricsCollector {
    /// Creates a collector retaining observations for `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                window,
                observations: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// The configured retention window.
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Records a successful call and its duration.
    pub fn record_success(&self, duration: Duration) {
        self.record(true, duration);
    }

    /// Records a failed call; `reason` is logged for diagnostics only.
    pub fn record_failure(&self, duration: Duration, reason: Option<&str>) {
        if let Some(reason) = reason {
            debug!("Recording failure: {}", reason);
        }
        self.record(false, duration);
    }

    fn record(&self, success: bool, duration: Duration) {
        let now = Instant::now();
        let mut observations = self.inner.observations.lock().unwrap();
        Self::evict(&mut observations, now, self.inner.window);
        observations.push_back(Observation {
            at: now,
            success,
            duration_ms: duration.as_millis() as u64,
        });
    }

    fn evict(observations: &mut VecDeque<Observation>, now: Instant, window: Duration) {
        while let Some(oldest) = observations.front() {
            if now.duration_since(oldest.at) > window {
                observations.pop_front();
            } else {
                break;
            }
        }
    }

    /// Total calls currently retained in the window.
    pub fn total_calls(&self) -> u64 {
        let now = Instant::now();
        let mut observations = self.inner.observations.lock().unwrap();
        Self::evict(&mut observations, now, self.inner.window);
        observations.len() as u64
    }

    /// Failure percentage over the current window (0 when no calls).
    pub fn failure_rate(&self) -> f64 {
        self.snapshot().failure_rate
    }

    /// Computes a consistent snapshot of the current window.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Instant::now();
        let mut observations = self.inner.observations.lock().unwrap();
        Self::evict(&mut observations, now, self.inner.window);

        if observations.is_empty() {
            return MetricsSnapshot::empty();
        }

        let total = observations.len() as u64;
        let failures = observations.iter().filter(|o| !o.success).count() as u64;
        let successes = total - failures;

        let mut durations: Vec<u64> = observations.iter().map(|o| o.duration_ms).collect();
        durations.sort_unstable();

        let sum: u64 = durations.iter().sum();

        MetricsSnapshot {
            total_calls: total,
            success_calls: successes,
            failure_calls: failures,
            failure_rate: (failures as f64 / total as f64) * 100.0,
            average_response_time: sum as f64 / total as f64,
            p50: percentile(&durations, 50.0),
            p95: percentile(&durations, 95.0),
            p99: percentile(&durations, 99.0),
            min: durations[0],
            max: durations[durations.len() - 1],
        }
    }

    /// Discards every retained observation.
    pub fn reset(&self) {
        self.inner.observations.lock().unwrap().clear();
    }
}

/// Nearest-rank percentile over a sorted slice of durations.
fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
