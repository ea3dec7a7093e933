//! Application configuration for the vanguard gateway.
//!
//! The configuration is a declarative JSON document: registry seed data,
//! resilience defaults, the metrics window, and the route table. It is
//! loaded once at startup (see [`crate::config::settings::load_settings`]),
//! validated, and never mutated afterwards.

use crate::models::instance::ServiceInstance;
use crate::models::route::RouteDefinition;
use crate::services::circuit_breaker::CircuitBreakerConfig;
use crate::services::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Discovery registry settings.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DiscoverySettings {
    /// Whether lookups may be served from the registry's cache
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Statically seeded instances per service, used by the in-memory
    /// registry when no external registry backend is wired in
    #[serde(default)]
    pub services: HashMap<String, Vec<ServiceInstance>>,
}

/// Fallback resilience parameters applied to routes that configure none.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResilienceSettings {
    /// Default overall upstream deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Default retry policy; `None` disables retries by default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_retry: Option<RetryConfig>,

    /// Default circuit breaker parameters
    #[serde(default)]
    pub default_circuit_breaker: CircuitBreakerConfig,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            default_retry: None,
            default_circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Metrics collection settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsSettings {
    /// Whether per-route metrics are collected
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sliding window length in milliseconds
    #[serde(default = "default_metrics_window_ms")]
    pub window_ms: u64,
}

fn default_metrics_window_ms() -> u64 {
    60_000
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: default_metrics_window_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Complete gateway configuration.
///
/// # Configuration File Format
///
/// ```json
/// {
///   "version": 1,
///   "discovery": {
///     "services": {
///       "user-service": [
///         { "id": "u1", "service_name": "user-service", "host": "localhost",
///           "port": 3001, "metadata": { "version": "v1" } }
///       ]
///     }
///   },
///   "resilience": { "default_timeout_ms": 3000 },
///   "metrics": { "enabled": true, "window_ms": 60000 },
///   "routes": [
///     { "path": "/api/users/**", "service_name": "user-service",
///       "methods": ["GET", "POST"], "strip_prefix": "/api" }
///   ]
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GatewaySettings {
    /// Configuration schema version, currently `1`
    pub version: u8,

    /// Registry settings and static instance seed
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Resilience defaults
    #[serde(default)]
    pub resilience: ResilienceSettings,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,

    /// Route table, most specific pattern wins regardless of order here
    pub routes: Vec<RouteDefinition>,
}

impl GatewaySettings {
    /// Validates every route definition.
    ///
    /// Returns the first validation error encountered; a valid settings
    /// value is safe to hand to the gateway builder.
    pub fn validate(&self) -> Result<(), String> {
        if self.version != 1 {
            return Err(format!(
                "unsupported configuration version {} (expected 1)",
                self.version
            ));
        }

        for route in &self.routes {
            route.validate()?;
        }

        Ok(())
    }
}
