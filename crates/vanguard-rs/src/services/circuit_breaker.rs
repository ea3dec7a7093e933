//! Circuit breaker implementation for upstream service protection.
//!
//! Breakers are shared through a name-keyed registry (conventionally
//! `gateway:<service>`), so every proxy pointed at the same service observes
//! and contributes to the same state. State changes are reported through the
//! gateway [`EventSink`](crate::services::events::EventSink).

use crate::services::events::{EventKind, EventSink, GatewayEvent};
use ahash::HashMap as AHashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// State of a circuit breaker.
///
/// * `Closed` - Normal operation, all requests pass through
/// * `Open` - Circuit tripped, requests fail fast without executing
/// * `HalfOpen` - Testing recovery, a bounded number of probes allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed = 0,
    /// Circuit is open - failing fast
    Open = 1,
    /// Testing if the service recovered
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Configuration parameters for circuit breaker behavior.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED that trip the circuit (default: 5)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u64,

    /// Time the circuit stays OPEN before probing recovery (default: 30s)
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Probes admitted in HALF_OPEN; all must succeed to close (default: 3)
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u64,
}

fn default_failure_threshold() -> u64 {
    5
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_half_open_max_calls() -> u64 {
    3
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

/// Rejection returned when the circuit refuses a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitRejected;

/// Circuit breaker protecting one upstream service.
///
/// # States
///
/// - **Closed**: requests pass through; `failure_threshold` consecutive
///   failures open the circuit.
/// - **Open**: requests are rejected immediately; after `cooldown_ms` the
///   next acquisition transitions to HalfOpen.
/// - **HalfOpen**: up to `half_open_max_calls` probes are admitted. When all
///   of them succeed the circuit closes; any failure reopens it and the
///   cooldown restarts.
///
/// # Thread Safety
///
/// Hot-path checks use atomics; the open timestamp sits behind an `RwLock`
/// taken only around state transitions.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU64,
    half_open_admitted: AtomicU64,
    half_open_successes: AtomicU64,
    opened_at: RwLock<Option<Instant>>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("failure_count", &self.failure_count)
            .field("half_open_admitted", &self.half_open_admitted)
            .field("half_open_successes", &self.half_open_successes)
            .field("opened_at", &self.opened_at)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a breaker reporting transitions to the given sink.
    pub fn new(name: String, config: CircuitBreakerConfig, events: Arc<dyn EventSink>) -> Arc<Self> {
        Arc::new(Self {
            name,
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU64::new(0),
            half_open_admitted: AtomicU64::new(0),
            half_open_successes: AtomicU64::new(0),
            opened_at: RwLock::new(None),
            events,
        })
    }

    /// The breaker's registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asks the breaker to admit one call.
    ///
    /// An OPEN breaker whose cooldown has elapsed transitions to HALF_OPEN
    /// here and admits the caller as the first probe.
    pub fn try_acquire(&self) -> Result<(), CircuitRejected> {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let cooled_down = self
                    .opened_at
                    .read()
                    .unwrap()
                    .map(|at| at.elapsed() >= Duration::from_millis(self.config.cooldown_ms))
                    .unwrap_or(true);

                if cooled_down {
                    self.transition_to_half_open();
                    self.half_open_admitted.store(1, Ordering::Release);
                    Ok(())
                } else {
                    debug!("Circuit breaker {} is open, failing fast", self.name);
                    Err(CircuitRejected)
                }
            }
            CircuitState::HalfOpen => {
                let admitted = self.half_open_admitted.fetch_add(1, Ordering::AcqRel);
                if admitted < self.config.half_open_max_calls {
                    Ok(())
                } else {
                    debug!(
                        "Circuit breaker {} half-open probe budget exhausted",
                        self.name
                    );
                    Err(CircuitRejected)
                }
            }
        }
    }

    /// Records a successful call outcome.
    pub fn record_success(&self) {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.half_open_max_calls {
                    self.transition_to_closed();
                }
            }
            CircuitState::Open => {
                debug!("Unexpected success in open state for circuit {}", self.name);
            }
        }
    }

    /// Records a failed call outcome.
    pub fn record_failure(&self) {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => {
                // Any failed probe reopens the circuit and restarts cooldown
                self.transition_to_open();
            }
            CircuitState::Open => {
                *self.opened_at.write().unwrap() = Some(Instant::now());
            }
        }
    }

    /// Executes an operation under breaker protection.
    ///
    /// Convenience wrapper over [`try_acquire`](Self::try_acquire) and the
    /// outcome recorders for callers running a single future.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        self.try_acquire()
            .map_err(|_| CircuitBreakerError::CircuitOpen)?;

        match operation.await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                Err(CircuitBreakerError::OperationFailed(error))
            }
        }
    }

    fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        *self.opened_at.write().unwrap() = Some(Instant::now());
        self.half_open_successes.store(0, Ordering::Release);
        self.half_open_admitted.store(0, Ordering::Release);

        warn!("Circuit breaker {} opened due to failures", self.name);
        self.events.emit(
            GatewayEvent::new(EventKind::CircuitOpen, "", &self.name)
                .with_data(json!({ "failure_count": self.failure_count.load(Ordering::Acquire) })),
        );
    }

    fn transition_to_half_open(&self) {
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);
        self.half_open_successes.store(0, Ordering::Release);
        self.half_open_admitted.store(0, Ordering::Release);

        info!("Circuit breaker {} transitioned to half-open", self.name);
        self.events
            .emit(GatewayEvent::new(EventKind::CircuitHalfOpen, "", &self.name));
    }

    fn transition_to_closed(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.half_open_successes.store(0, Ordering::Release);
        self.half_open_admitted.store(0, Ordering::Release);

        info!("Circuit breaker {} closed - service recovered", self.name);
        self.events
            .emit(GatewayEvent::new(EventKind::CircuitClose, "", &self.name));
    }

    /// Current breaker state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Consecutive failures counted in the CLOSED state.
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Acquire)
    }
}

/// Errors produced by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Name-keyed registry sharing breakers across proxies.
///
/// The registry is owned by the gateway and handed to every proxy, so two
/// routes forwarding to the same service converge on one breaker.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<AHashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the breaker registered under `name`, creating it with the
    /// given configuration on first use. Later calls ignore `config`.
    pub fn get_or_create(
        &self,
        name: &str,
        config: &CircuitBreakerConfig,
        events: Arc<dyn EventSink>,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().unwrap().get(name) {
            return existing.clone();
        }

        let mut breakers = self.breakers.write().unwrap();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| CircuitBreaker::new(name.to_string(), config.clone(), events))
            .clone()
    }

    /// Looks up an existing breaker.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().unwrap().get(name).cloned()
    }

    /// Snapshot of every breaker's state for diagnostics.
    pub fn states(&self) -> Vec<(String, CircuitState, u64)> {
        self.breakers
            .read()
            .unwrap()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state(), breaker.failure_count()))
            .collect()
    }
}
