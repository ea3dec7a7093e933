//! Progressive canary rollout state machine.
//!
//! Each canary-configured route owns one engine managing the traffic split
//! between a stable and a canary version. Request dispatch reads the canary
//! weight from an atomic, so the hot path never takes the engine lock; all
//! state mutations (evaluation decisions, step advances, manual controls)
//! serialize on an internal mutex.
//!
//! The engine owns at most two timers: the periodic evaluation task and one
//! outstanding promotion step timer. Terminal transitions and `stop()`
//! clear both.

use crate::models::route::{CanaryConfig, PromotionStrategy};
use crate::services::events::{EventKind, EventSink, GatewayEvent};
use crate::services::metrics::{MetricsCollector, MetricsSnapshot};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Lifecycle state of a canary rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanaryState {
    /// Evaluation loop is running and weights may change
    Active,
    /// Canary reached 100%; weights are frozen
    Promoted,
    /// Canary was rolled back to 0%; weights are frozen
    RolledBack,
    /// Evaluation halted, weights preserved
    Paused,
}

/// Which version a request was dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanaryTarget {
    /// The incumbent version
    Stable,
    /// The rollout candidate
    Canary,
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanaryDecision {
    /// Metrics are healthy; a weight step may be scheduled
    Promote,
    /// Metrics breach the threshold; traffic should return to stable
    Rollback,
    /// No decision (insufficient data, paused, or automation disabled)
    Hold,
}

/// What initiated a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackTrigger {
    /// The evaluation loop breached a threshold
    Auto,
    /// An operator called `rollback()`
    Manual,
}

/// Evaluator callback used by [`PromotionStrategy::Custom`].
pub type CustomEvaluator = dyn Fn(&MetricsSnapshot) -> CanaryDecision + Send + Sync;

/// Point-in-time view of a canary rollout.
#[derive(Debug, Clone, Serialize)]
pub struct CanaryStatus {
    /// Current lifecycle state
    pub state: CanaryState,
    /// Incumbent version tag
    pub stable_version: String,
    /// Candidate version tag
    pub canary_version: String,
    /// Stable traffic share in percent
    pub stable_weight: u32,
    /// Canary traffic share in percent
    pub canary_weight: u32,
    /// Index of the last applied progression step, if any
    pub step_index: Option<usize>,
    /// Length of the configured progression
    pub total_steps: usize,
    /// Stable-side window metrics
    pub stable_metrics: MetricsSnapshot,
    /// Canary-side window metrics
    pub canary_metrics: MetricsSnapshot,
    /// When the evaluation loop last ran
    pub last_evaluation: Option<DateTime<Utc>>,
    /// When the state or weights last changed
    pub last_transition: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct EngineState {
    state: CanaryState,
    step_index: Option<usize>,
    last_evaluation: Option<DateTime<Utc>>,
    last_transition: Option<DateTime<Utc>>,
}

struct EngineCore {
    route: String,
    service: String,
    config: CanaryConfig,
    canary_weight: AtomicU32,
    state: Mutex<EngineState>,
    stable_metrics: MetricsCollector,
    canary_metrics: MetricsCollector,
    evaluator: RwLock<Option<Arc<CustomEvaluator>>>,
    events: Arc<dyn EventSink>,
    eval_task: Mutex<Option<JoinHandle<()>>>,
    promote_task: Mutex<Option<JoinHandle<()>>>,
}

/// Per-route canary rollout engine.
///
/// Cheap to clone; every clone drives the same rollout.
#[derive(Clone)]
pub struct CanaryEngine {
    core: Arc<EngineCore>,
}

impl CanaryEngine {
    /// Creates an engine in the ACTIVE state with the configured initial
    /// weights. Timers do not run until [`start`](Self::start) is called.
    pub fn new(
        route: &str,
        service: &str,
        config: CanaryConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let window = config.promotion.evaluation_window.duration();

        Self {
            core: Arc::new(EngineCore {
                route: route.to_string(),
                service: service.to_string(),
                canary_weight: AtomicU32::new(config.canary.weight),
                state: Mutex::new(EngineState {
                    state: CanaryState::Active,
                    step_index: None,
                    last_evaluation: None,
                    last_transition: None,
                }),
                stable_metrics: MetricsCollector::new(window),
                canary_metrics: MetricsCollector::new(window),
                evaluator: RwLock::new(None),
                events,
                eval_task: Mutex::new(None),
                promote_task: Mutex::new(None),
                config,
            }),
        }
    }

    /// Installs the evaluator used by the `custom` promotion strategy.
    pub fn set_custom_evaluator<F>(&self, evaluator: F)
    where
        F: Fn(&MetricsSnapshot) -> CanaryDecision + Send + Sync + 'static,
    {
        *self.core.evaluator.write().unwrap() = Some(Arc::new(evaluator));
    }

    /// Launches the periodic evaluation task. Idempotent.
    pub fn start(&self) {
        let mut eval_task = self.core.eval_task.lock().unwrap();
        if eval_task.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }

        *eval_task = Some(Self::spawn_eval_loop(&self.core));
        drop(eval_task);

        info!(
            "Canary started on route {} ({} -> {})",
            self.core.route, self.core.config.stable.version, self.core.config.canary.version
        );
        self.emit(EventKind::CanaryStarted)
            .with_weights(self.weights());
    }

    /// Cancels both engine timers. Idempotent; weights are untouched.
    pub fn stop(&self) {
        self.abort_timers();
    }

    /// Picks the version for one request by independent weighted random.
    ///
    /// Lock-free: only the atomic canary weight is read, so dispatch always
    /// sees a consistent split even while an evaluation runs.
    pub fn select_version(&self) -> CanaryTarget {
        let weight = self.core.canary_weight.load(Ordering::Acquire);
        if weight >= 100 {
            return CanaryTarget::Canary;
        }
        if weight == 0 {
            return CanaryTarget::Stable;
        }

        if rand::thread_rng().gen_range(0..100) < weight {
            CanaryTarget::Canary
        } else {
            CanaryTarget::Stable
        }
    }

    /// The version tag behind a dispatch target.
    pub fn version_of(&self, target: CanaryTarget) -> &str {
        match target {
            CanaryTarget::Stable => &self.core.config.stable.version,
            CanaryTarget::Canary => &self.core.config.canary.version,
        }
    }

    /// Records a successful call against the target's metrics window.
    pub fn record_success(&self, target: CanaryTarget, duration: Duration) {
        self.metrics_of(target).record_success(duration);
    }

    /// Records a failed call against the target's metrics window.
    pub fn record_failure(&self, target: CanaryTarget, duration: Duration, reason: Option<&str>) {
        self.metrics_of(target).record_failure(duration, reason);
    }

    fn metrics_of(&self, target: CanaryTarget) -> &MetricsCollector {
        match target {
            CanaryTarget::Stable => &self.core.stable_metrics,
            CanaryTarget::Canary => &self.core.canary_metrics,
        }
    }

    /// Runs one evaluation pass and acts on the decision.
    ///
    /// Called by the evaluation timer; exposed so hosts and tests can force
    /// an evaluation without waiting out the window. Returns the action
    /// actually taken: a healthy canary with `auto_promote` disabled holds,
    /// as does any evaluation with fewer than `min_requests` canary calls.
    pub fn evaluate_now(&self) -> CanaryDecision {
        let promotion = &self.core.config.promotion;

        let decision = {
            let mut state = self.core.state.lock().unwrap();
            if state.state != CanaryState::Active {
                return CanaryDecision::Hold;
            }

            state.last_evaluation = Some(Utc::now());

            if self.core.canary_metrics.total_calls() < promotion.min_requests {
                return CanaryDecision::Hold;
            }

            let snapshot = self.core.canary_metrics.snapshot();
            match promotion.strategy {
                PromotionStrategy::ErrorRate => {
                    if snapshot.failure_rate > promotion.error_threshold {
                        CanaryDecision::Rollback
                    } else {
                        CanaryDecision::Promote
                    }
                }
                PromotionStrategy::Latency => {
                    if snapshot.p99 > promotion.latency_threshold_ms {
                        CanaryDecision::Rollback
                    } else {
                        CanaryDecision::Promote
                    }
                }
                PromotionStrategy::Custom => {
                    let evaluator = self.core.evaluator.read().unwrap().clone();
                    match evaluator {
                        Some(evaluate) => evaluate(&snapshot),
                        None => CanaryDecision::Hold,
                    }
                }
            }
        };

        match decision {
            CanaryDecision::Rollback if promotion.auto_rollback => {
                self.do_rollback(RollbackTrigger::Auto);
                CanaryDecision::Rollback
            }
            CanaryDecision::Promote if promotion.auto_promote => {
                self.schedule_step();
                CanaryDecision::Promote
            }
            _ => CanaryDecision::Hold,
        }
    }

    /// Manually advances one progression step immediately.
    pub fn promote(&self) {
        self.advance_step();
    }

    /// Manually rolls the canary back to zero traffic.
    pub fn rollback(&self) {
        self.do_rollback(RollbackTrigger::Manual);
    }

    /// Halts evaluation while preserving the current weights.
    pub fn pause(&self) {
        {
            let mut state = self.core.state.lock().unwrap();
            if state.state != CanaryState::Active {
                return;
            }
            state.state = CanaryState::Paused;
            state.last_transition = Some(Utc::now());
        }

        self.abort_timers();
        info!("Canary paused on route {}", self.core.route);
        self.emit(EventKind::CanaryPaused).with_weights(self.weights());
    }

    /// Resumes a paused rollout and restarts the evaluation loop.
    pub fn resume(&self) {
        {
            let mut state = self.core.state.lock().unwrap();
            if state.state != CanaryState::Paused {
                return;
            }
            state.state = CanaryState::Active;
            state.last_transition = Some(Utc::now());
        }

        *self.core.eval_task.lock().unwrap() = Some(Self::spawn_eval_loop(&self.core));
        info!("Canary resumed on route {}", self.core.route);
        self.emit(EventKind::CanaryResumed)
            .with_weights(self.weights());
    }

    /// Explicitly resets a terminal rollout back to its initial weights.
    ///
    /// This is the only exit from PROMOTED and ROLLED_BACK. Metrics windows
    /// are cleared; the evaluation loop must be restarted with
    /// [`start`](Self::start).
    pub fn reset(&self) {
        self.abort_timers();

        let mut state = self.core.state.lock().unwrap();
        state.state = CanaryState::Active;
        state.step_index = None;
        state.last_transition = Some(Utc::now());
        self.core
            .canary_weight
            .store(self.core.config.canary.weight, Ordering::Release);
        drop(state);

        self.core.stable_metrics.reset();
        self.core.canary_metrics.reset();
    }

    /// Current rollout status snapshot.
    pub fn status(&self) -> CanaryStatus {
        let (canary_weight, stable_weight) = self.weights();
        let state = self.core.state.lock().unwrap();

        CanaryStatus {
            state: state.state,
            stable_version: self.core.config.stable.version.clone(),
            canary_version: self.core.config.canary.version.clone(),
            stable_weight,
            canary_weight,
            step_index: state.step_index,
            total_steps: self.core.config.promotion.steps.len(),
            stable_metrics: self.core.stable_metrics.snapshot(),
            canary_metrics: self.core.canary_metrics.snapshot(),
            last_evaluation: state.last_evaluation,
            last_transition: state.last_transition,
        }
    }

    /// Current `(canary, stable)` weights; always sums to 100.
    fn weights(&self) -> (u32, u32) {
        let canary = self.core.canary_weight.load(Ordering::Acquire).min(100);
        (canary, 100 - canary)
    }

    fn spawn_eval_loop(core: &Arc<EngineCore>) -> JoinHandle<()> {
        let weak: Weak<EngineCore> = Arc::downgrade(core);
        let window = core.config.promotion.evaluation_window.duration();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(window).await;
                match weak.upgrade() {
                    Some(core) => {
                        CanaryEngine { core }.evaluate_now();
                    }
                    None => break,
                }
            }
        })
    }

    /// Schedules one weight step after `step_interval`.
    ///
    /// At most one promotion timer is outstanding; a pending timer makes
    /// this a no-op.
    fn schedule_step(&self) {
        let mut promote_task = self.core.promote_task.lock().unwrap();
        if promote_task
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
        {
            return;
        }

        let weak = Arc::downgrade(&self.core);
        let interval = self.core.config.promotion.step_interval.duration();

        *promote_task = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some(core) = weak.upgrade() {
                CanaryEngine { core }.advance_step();
            }
        }));
    }

    fn advance_step(&self) {
        let steps = &self.core.config.promotion.steps;
        let completed;
        let applied;

        {
            let mut state = self.core.state.lock().unwrap();
            if state.state != CanaryState::Active {
                return;
            }

            let current = self.core.canary_weight.load(Ordering::Acquire);
            let next_index = match state.step_index {
                Some(index) => index + 1,
                // First advance: skip steps at or below the starting weight
                None => steps.iter().position(|s| *s > current).unwrap_or(steps.len()),
            };

            if next_index >= steps.len() {
                self.core.canary_weight.store(100, Ordering::Release);
                state.state = CanaryState::Promoted;
                state.last_transition = Some(Utc::now());
                completed = true;
                applied = None;
            } else {
                let weight = steps[next_index].min(100);
                self.core.canary_weight.store(weight, Ordering::Release);
                state.step_index = Some(next_index);
                state.last_transition = Some(Utc::now());

                if weight >= 100 {
                    state.state = CanaryState::Promoted;
                    completed = true;
                } else {
                    completed = false;
                }
                applied = Some((next_index, weight));
            }
        }

        if let Some((step, weight)) = applied {
            info!(
                "Canary step {} on route {}: canary weight {}%",
                step, self.core.route, weight
            );
            self.emit(EventKind::CanaryPromote).with_data(json!({
                "step": step,
                "canary_weight": weight,
                "stable_weight": 100 - weight,
            }));
        }

        if completed {
            self.abort_timers();
            info!("Canary complete on route {}", self.core.route);
            self.emit(EventKind::CanaryComplete).with_data(json!({
                "canary_weight": 100,
                "stable_weight": 0,
            }));
        }
    }

    fn do_rollback(&self, trigger: RollbackTrigger) {
        {
            let mut state = self.core.state.lock().unwrap();
            if matches!(state.state, CanaryState::Promoted | CanaryState::RolledBack) {
                return;
            }
            state.state = CanaryState::RolledBack;
            state.last_transition = Some(Utc::now());
            self.core.canary_weight.store(0, Ordering::Release);
        }

        self.abort_timers();
        warn!(
            "Canary rolled back on route {} (trigger: {:?})",
            self.core.route, trigger
        );
        self.emit(EventKind::CanaryRollback).with_data(json!({
            "trigger": trigger,
            "canary_weight": 0,
            "stable_weight": 100,
        }));
    }

    fn abort_timers(&self) {
        if let Some(handle) = self.core.eval_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.core.promote_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn emit(&self, kind: EventKind) -> EventEmission<'_> {
        EventEmission {
            engine: self,
            kind,
        }
    }
}

/// Builder-style helper so call sites read `self.emit(kind).with_data(..)`.
struct EventEmission<'a> {
    engine: &'a CanaryEngine,
    kind: EventKind,
}

impl EventEmission<'_> {
    fn with_data(self, data: serde_json::Value) {
        let event = GatewayEvent::new(self.kind, &self.engine.core.route, &self.engine.core.service)
            .with_data(data);
        self.engine.core.events.emit(event);
    }

    fn with_weights(self, weights: (u32, u32)) {
        self.with_data(json!({
            "canary_weight": weights.0,
            "stable_weight": weights.1,
        }));
    }
}
