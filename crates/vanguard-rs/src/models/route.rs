//! Route configuration: patterns, targets, and policy bundles.
//!
//! A [`RouteDefinition`] maps one path pattern to one upstream service plus
//! the optional policies that shape how traffic reaches it: resilience
//! (timeout, retry, circuit breaking, rate limiting), version routing,
//! progressive canary delivery, and traffic mirroring. Definitions are
//! created at gateway construction and never change afterwards.

use crate::models::instance::DiscoveryFilter;
use crate::services::circuit_breaker::CircuitBreakerConfig;
use crate::services::rate_limit::RateLimitConfig;
use crate::services::retry::RetryConfig;
use crate::services::transform::TransformConfig;
use crate::utils::duration::DurationValue;
use crate::utils::pattern::RoutePattern;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Load balancing strategy for distributing requests across instances.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancingStrategy {
    /// Even circular distribution (default)
    RoundRobin,
    /// Uniform random selection
    Random,
    /// Fewest in-flight requests wins
    LeastConnections,
    /// Rotation proportional to `metadata.weight`
    WeightedRoundRobin,
    /// Client-address affinity
    IpHash,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

/// How an explicit version request is extracted from a request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VersionStrategy {
    /// From a request header (default `X-API-Version`)
    Header,
    /// From a leading `/vN` path segment
    Uri,
    /// From a query parameter (default `version`)
    Query,
}

/// One routable version of a service.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VersionEntry {
    /// Share of implicit traffic; entries sum to the sampling space
    #[serde(default)]
    pub weight: u32,

    /// Whether explicit requests may reach this version even at weight 0
    /// (dark launch)
    #[serde(default)]
    pub allow_explicit: bool,

    /// Extra discovery constraints for this version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<DiscoveryFilter>,
}

/// Version routing policy for a route.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VersionRouteConfig {
    /// Resolution strategies tried in priority order
    #[serde(default = "default_version_strategies", with = "strategy_list")]
    pub strategy: Vec<VersionStrategy>,

    /// Header carrying the requested version
    #[serde(default = "default_version_header")]
    pub header: String,

    /// Query parameter carrying the requested version
    #[serde(default = "default_version_query_param")]
    pub query_param: String,

    /// Routable versions keyed by version tag
    pub routes: HashMap<String, VersionEntry>,
}

fn default_version_strategies() -> Vec<VersionStrategy> {
    vec![
        VersionStrategy::Header,
        VersionStrategy::Uri,
        VersionStrategy::Query,
    ]
}

fn default_version_header() -> String {
    "X-API-Version".to_string()
}

fn default_version_query_param() -> String {
    "version".to_string()
}

/// Accepts `"header"` as well as `["header", "query"]` in configuration.
mod strategy_list {
    use super::VersionStrategy;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &[VersionStrategy], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<VersionStrategy>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(VersionStrategy),
            Many(Vec<VersionStrategy>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(strategy) => vec![strategy],
            Raw::Many(strategies) => strategies,
        })
    }
}

/// A version tag paired with its traffic weight.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VersionWeight {
    /// Version tag matched against `metadata.version`
    pub version: String,
    /// Traffic share in percent
    pub weight: u32,
}

/// Signal the canary engine evaluates to drive promotion.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PromotionStrategy {
    /// Compare canary failure rate against `error_threshold`
    ErrorRate,
    /// Compare canary p99 latency against `latency_threshold_ms`
    Latency,
    /// Delegate to an evaluator installed on the engine
    Custom,
}

impl Default for PromotionStrategy {
    fn default() -> Self {
        Self::ErrorRate
    }
}

/// Promotion policy governing a canary rollout.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PromotionPolicy {
    /// Evaluation signal
    #[serde(default)]
    pub strategy: PromotionStrategy,

    /// Failure-rate ceiling in percent for the error-rate strategy
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,

    /// p99 latency ceiling in milliseconds for the latency strategy
    #[serde(default = "default_latency_threshold_ms")]
    pub latency_threshold_ms: u64,

    /// Canary requests required before any decision is made
    #[serde(default = "default_min_requests")]
    pub min_requests: u64,

    /// Metrics window and evaluation cadence
    #[serde(default = "default_evaluation_window")]
    pub evaluation_window: DurationValue,

    /// Delay between a promote decision and the weight step
    #[serde(default = "default_step_interval")]
    pub step_interval: DurationValue,

    /// Monotonically increasing canary weight progression
    #[serde(default = "default_steps")]
    pub steps: Vec<u32>,

    /// Whether healthy evaluations schedule weight steps automatically
    #[serde(default = "default_true")]
    pub auto_promote: bool,

    /// Whether unhealthy evaluations roll back automatically
    #[serde(default = "default_true")]
    pub auto_rollback: bool,
}

fn default_error_threshold() -> f64 {
    5.0
}

fn default_latency_threshold_ms() -> u64 {
    1_000
}

fn default_min_requests() -> u64 {
    10
}

fn default_evaluation_window() -> DurationValue {
    DurationValue(Duration::from_secs(5 * 60))
}

fn default_step_interval() -> DurationValue {
    DurationValue(Duration::from_secs(10 * 60))
}

fn default_steps() -> Vec<u32> {
    vec![10, 25, 50, 75, 100]
}

fn default_true() -> bool {
    true
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            strategy: PromotionStrategy::default(),
            error_threshold: default_error_threshold(),
            latency_threshold_ms: default_latency_threshold_ms(),
            min_requests: default_min_requests(),
            evaluation_window: default_evaluation_window(),
            step_interval: default_step_interval(),
            steps: default_steps(),
            auto_promote: true,
            auto_rollback: true,
        }
    }
}

/// Canary rollout configuration for a route.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CanaryConfig {
    /// Incumbent version and its starting weight
    pub stable: VersionWeight,

    /// New version and its starting weight
    pub canary: VersionWeight,

    /// Promotion policy
    #[serde(default)]
    pub promotion: PromotionPolicy,
}

impl CanaryConfig {
    /// Validates weight and step invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.stable.weight + self.canary.weight != 100 {
            return Err(format!(
                "canary weights must sum to 100 (stable={}, canary={})",
                self.stable.weight, self.canary.weight
            ));
        }

        if self.stable.version == self.canary.version {
            return Err("stable and canary versions must differ".to_string());
        }

        if self.promotion.steps.is_empty() {
            return Err("canary steps must not be empty".to_string());
        }

        let mut previous = 0;
        for step in &self.promotion.steps {
            if *step <= previous {
                return Err("canary steps must be strictly increasing".to_string());
            }
            if *step > 100 {
                return Err("canary steps must not exceed 100".to_string());
            }
            previous = *step;
        }

        if !(0.0..=100.0).contains(&self.promotion.error_threshold) {
            return Err("error_threshold must be between 0 and 100".to_string());
        }

        Ok(())
    }
}

/// Traffic mirroring configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MirrorConfig {
    /// Shadow target service
    pub service: String,

    /// Share of primary traffic to duplicate, in percent
    #[serde(default = "default_mirror_percentage")]
    pub percentage: f64,

    /// Whether to await the shadow response (default: fire-and-forget)
    #[serde(default)]
    pub wait_for_response: bool,

    /// Independent deadline for shadow requests
    #[serde(default = "default_mirror_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_mirror_percentage() -> f64 {
    100.0
}

fn default_mirror_timeout_ms() -> u64 {
    2_000
}

/// Mirroring and transform policies attached to a route.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TrafficPolicy {
    /// Shadow-traffic configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<MirrorConfig>,

    /// Header rewrites applied to the outbound request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_transform: Option<TransformConfig>,

    /// Header rewrites applied to the inbound response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_transform: Option<TransformConfig>,
}

/// Configuration for one gateway route.
///
/// # Examples
///
/// ```json
/// {
///   "path": "/api/users/**",
///   "service_name": "user-service",
///   "methods": ["GET", "POST"],
///   "strip_prefix": "/api",
///   "add_prefix": "/v1",
///   "filter": { "metadata": { "region": "eu" } },
///   "rate_limit": { "strategy": "sliding-window", "max": 100, "window": 60000 }
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RouteDefinition {
    /// Path pattern (`:param`, `*`, trailing `**` supported)
    pub path: String,

    /// Upstream service name in the discovery registry
    pub service_name: String,

    /// HTTP method allow-list; `None` admits every method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,

    /// Prefix removed from the request path before forwarding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_prefix: Option<String>,

    /// Prefix prepended to the rewritten path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_prefix: Option<String>,

    /// Default discovery constraints for this route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<DiscoveryFilter>,

    /// Instance selection strategy
    #[serde(default)]
    pub load_balancing: LoadBalancingStrategy,

    /// Overall upstream deadline in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Retry policy for transient failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Circuit breaker parameters (shared per service)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    /// Request admission limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    /// Header/URI/query driven version selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_route: Option<VersionRouteConfig>,

    /// Progressive canary rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary: Option<CanaryConfig>,

    /// Mirroring and transforms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<TrafficPolicy>,
}

const VALID_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "TRACE",
];

impl RouteDefinition {
    /// Validates the route definition for correctness.
    ///
    /// Checks that the pattern compiles, methods are standard HTTP methods,
    /// and every attached policy is internally consistent.
    pub fn validate(&self) -> Result<(), String> {
        RoutePattern::parse(&self.path).map_err(|e| e.to_string())?;

        if self.service_name.is_empty() {
            return Err(format!("route {} has an empty service_name", self.path));
        }

        if let Some(methods) = &self.methods {
            if methods.is_empty() {
                return Err(format!(
                    "route {} has an empty method allow-list; omit it to allow all methods",
                    self.path
                ));
            }
            for method in methods {
                if !VALID_METHODS.contains(&method.to_uppercase().as_str()) {
                    return Err(format!("Invalid HTTP method: {}", method));
                }
            }
        }

        if let Some(retry) = &self.retry {
            retry.validate()?;
        }

        if let Some(rate_limit) = &self.rate_limit {
            if rate_limit.max == 0 {
                return Err(format!("route {} rate limit max must be > 0", self.path));
            }
            if rate_limit.window_ms == 0 {
                return Err(format!("route {} rate limit window must be > 0", self.path));
            }
        }

        if let Some(version_route) = &self.version_route {
            if version_route.routes.is_empty() {
                return Err(format!(
                    "route {} version routing requires at least one version",
                    self.path
                ));
            }
        }

        if let Some(canary) = &self.canary {
            canary.validate()?;
        }

        if let Some(policy) = &self.traffic_policy {
            if let Some(mirror) = &policy.mirror {
                if !(0.0..=100.0).contains(&mirror.percentage) {
                    return Err(format!(
                        "route {} mirror percentage must be between 0 and 100",
                        self.path
                    ));
                }
            }
        }

        Ok(())
    }

    /// Whether the given HTTP method passes this route's allow-list.
    pub fn allows_method(&self, method: &str) -> bool {
        match &self.methods {
            Some(methods) => methods.iter().any(|m| m.eq_ignore_ascii_case(method)),
            None => true,
        }
    }
}
