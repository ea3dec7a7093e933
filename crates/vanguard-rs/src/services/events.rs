//! Structured gateway events.
//!
//! Components report notable transitions through a narrow [`EventSink`]
//! interface with enumerated event kinds; there is no string-typed
//! subscription surface. The host wires a sink at construction; the default
//! sink writes structured log lines.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::sync::Mutex;

/// Enumerated event kinds emitted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    /// Canary engine started its evaluation loop
    CanaryStarted,
    /// Canary weight advanced one step
    CanaryPromote,
    /// Canary reached 100% and was promoted
    CanaryComplete,
    /// Canary weight was reset to zero
    CanaryRollback,
    /// Canary evaluation was paused
    CanaryPaused,
    /// Canary evaluation resumed
    CanaryResumed,
    /// A circuit breaker opened
    CircuitOpen,
    /// A circuit breaker began probing recovery
    CircuitHalfOpen,
    /// A circuit breaker closed
    CircuitClose,
    /// A route's rate limiter rejected a request
    RateLimitExceeded,
    /// Request handling failed with a gateway error
    RouteError,
    /// An upstream call exceeded its deadline
    RouteTimeout,
}

impl EventKind {
    /// Canonical wire name of the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CanaryStarted => "canary:started",
            EventKind::CanaryPromote => "canary:promote",
            EventKind::CanaryComplete => "canary:complete",
            EventKind::CanaryRollback => "canary:rollback",
            EventKind::CanaryPaused => "canary:paused",
            EventKind::CanaryResumed => "canary:resumed",
            EventKind::CircuitOpen => "circuit:open",
            EventKind::CircuitHalfOpen => "circuit:half-open",
            EventKind::CircuitClose => "circuit:close",
            EventKind::RateLimitExceeded => "rate-limit:exceeded",
            EventKind::RouteError => "route:error",
            EventKind::RouteTimeout => "route:timeout",
        }
    }
}

/// A single structured event.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayEvent {
    /// What happened
    pub kind: EventKind,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Route pattern the event is attributed to ("" for global events)
    pub route: String,
    /// Service name the event is attributed to
    pub service: String,
    /// Kind-specific payload
    pub data: serde_json::Value,
}

impl GatewayEvent {
    /// Creates an event with an empty payload, stamped now.
    pub fn new(kind: EventKind, route: &str, service: &str) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            route: route.to_string(),
            service: service.to_string(),
            data: serde_json::Value::Null,
        }
    }

    /// Attaches a kind-specific payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Destination for gateway events.
pub trait EventSink: Send + Sync {
    /// Delivers one event. Implementations must not block request handling.
    fn emit(&self, event: GatewayEvent);
}

/// Default sink writing structured log lines.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: GatewayEvent) {
        match event.kind {
            EventKind::RouteError | EventKind::CircuitOpen | EventKind::CanaryRollback => warn!(
                "[{}] route={} service={} data={}",
                event.kind.as_str(),
                event.route,
                event.service,
                event.data
            ),
            _ => info!(
                "[{}] route={} service={} data={}",
                event.kind.as_str(),
                event.route,
                event.service,
                event.data
            ),
        }
    }
}

/// Sink that retains events in memory; used by tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<GatewayEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out every event seen so far.
    pub fn events(&self) -> Vec<GatewayEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of retained events of the given kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: GatewayEvent) {
        self.events.lock().unwrap().push(event);
    }
}
