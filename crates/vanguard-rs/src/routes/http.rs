//! Request orchestration: route lookup, dispatch, and edge error mapping.
//!
//! The [`GatewayService`] owns the specificity-sorted route table. For each
//! request it picks the most specific matching route, dispatches through
//! that route's canary engine, version router, or plain proxy, records the
//! outcome in route- and version-tagged metrics, fires the traffic mirror,
//! and maps failures to the gateway's HTTP error contract.

use crate::models::error::GatewayError;
use crate::models::http::{GatewayRequest, GatewayResponse};
use crate::models::route::RouteDefinition;
use crate::models::settings::GatewaySettings;
use crate::services::canary::{CanaryEngine, CanaryStatus, CanaryTarget};
use crate::services::circuit_breaker::CircuitBreakerRegistry;
use crate::services::discovery::DiscoveryClient;
use crate::services::events::{EventKind, EventSink, GatewayEvent};
use crate::services::metrics::{MetricsCollector, MetricsSnapshot};
use crate::services::mirror::TrafficMirror;
use crate::services::proxy::{ProxyConfig, ServiceProxy};
use crate::services::version_router::VersionRouter;
use crate::utils::pattern::{compare_specificity, RoutePattern};
use actix_web::error::ResponseError;
use actix_web::{web, HttpRequest, HttpResponse};
use ahash::HashMap as AHashMap;
use log::debug;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Everything the gateway holds for one configured route.
pub struct RouteRuntime {
    definition: RouteDefinition,
    pattern: RoutePattern,
    proxy: ServiceProxy,
    canary: Option<CanaryEngine>,
    version_router: Option<VersionRouter>,
    mirror: Option<TrafficMirror>,
    metrics: MetricsCollector,
    version_metrics: Mutex<AHashMap<String, MetricsCollector>>,
    metrics_window: Duration,
}

impl RouteRuntime {
    /// The route's path pattern.
    pub fn path(&self) -> &str {
        self.pattern.raw()
    }

    /// The route's upstream service.
    pub fn service_name(&self) -> &str {
        &self.definition.service_name
    }

    /// Route-level aggregate metrics.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// The canary engine, when this route runs a rollout.
    pub fn canary(&self) -> Option<&CanaryEngine> {
        self.canary.as_ref()
    }

    fn record_tagged(&self, version: Option<&str>, success: bool, duration: Duration, reason: Option<&str>) {
        if success {
            self.metrics.record_success(duration);
        } else {
            self.metrics.record_failure(duration, reason);
        }

        if let Some(version) = version {
            let collector = {
                let mut tagged = self.version_metrics.lock().unwrap();
                tagged
                    .entry(version.to_string())
                    .or_insert_with(|| MetricsCollector::new(self.metrics_window))
                    .clone()
            };
            if success {
                collector.record_success(duration);
            } else {
                collector.record_failure(duration, reason);
            }
        }
    }

    fn version_snapshots(&self) -> HashMap<String, MetricsSnapshot> {
        self.version_metrics
            .lock()
            .unwrap()
            .iter()
            .map(|(version, collector)| (version.clone(), collector.snapshot()))
            .collect()
    }
}

/// Status payload for one route on the metrics surface.
#[derive(Debug, Serialize)]
pub struct RouteStatus {
    /// Route pattern
    pub path: String,
    /// Upstream service
    pub service: String,
    /// Aggregate window metrics
    pub metrics: MetricsSnapshot,
    /// Version-tagged window metrics
    pub versions: HashMap<String, MetricsSnapshot>,
    /// Canary status when a rollout is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canary: Option<CanaryStatus>,
}

/// The gateway orchestrator.
///
/// Built once from validated settings; shared across workers behind an
/// `Arc`. All mutable state lives inside the per-route runtimes.
pub struct GatewayService {
    routes: Vec<Arc<RouteRuntime>>,
    discovery: Arc<dyn DiscoveryClient>,
    breakers: Arc<CircuitBreakerRegistry>,
    events: Arc<dyn EventSink>,
}

impl GatewayService {
    /// Builds the route table from validated settings.
    ///
    /// Proxies inherit the resilience defaults for anything their route does
    /// not override. Routes are sorted most-specific-first once, here.
    pub fn from_settings(
        settings: &GatewaySettings,
        discovery: Arc<dyn DiscoveryClient>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, String> {
        let breakers = Arc::new(CircuitBreakerRegistry::new());
        let metrics_window = Duration::from_millis(settings.metrics.window_ms);

        let mut routes = Vec::with_capacity(settings.routes.len());
        for definition in &settings.routes {
            let pattern = RoutePattern::parse(&definition.path).map_err(|e| e.to_string())?;

            let traffic_policy = definition.traffic_policy.clone().unwrap_or_default();

            let proxy_config = ProxyConfig {
                service_name: definition.service_name.clone(),
                filter: definition.filter.clone().unwrap_or_default(),
                strip_prefix: definition.strip_prefix.clone(),
                add_prefix: definition.add_prefix.clone(),
                load_balancing: definition.load_balancing,
                timeout: Duration::from_millis(
                    definition
                        .timeout_ms
                        .unwrap_or(settings.resilience.default_timeout_ms),
                ),
                retry: definition
                    .retry
                    .clone()
                    .or_else(|| settings.resilience.default_retry.clone()),
                rate_limit: definition.rate_limit.clone(),
                circuit_breaker: definition
                    .circuit_breaker
                    .clone()
                    .unwrap_or_else(|| settings.resilience.default_circuit_breaker.clone()),
                request_transform: traffic_policy.request_transform.clone(),
                response_transform: traffic_policy.response_transform.clone(),
                metrics_window,
            };

            let proxy =
                ServiceProxy::new(proxy_config, discovery.clone(), &breakers, events.clone());

            let canary = definition.canary.clone().map(|config| {
                CanaryEngine::new(
                    &definition.path,
                    &definition.service_name,
                    config,
                    events.clone(),
                )
            });

            let version_router = definition.version_route.clone().map(VersionRouter::new);

            let mirror = traffic_policy
                .mirror
                .map(|config| TrafficMirror::new(config, discovery.clone()));

            routes.push(Arc::new(RouteRuntime {
                definition: definition.clone(),
                pattern,
                proxy,
                canary,
                version_router,
                mirror,
                metrics: MetricsCollector::new(metrics_window),
                version_metrics: Mutex::new(AHashMap::default()),
                metrics_window,
            }));
        }

        routes.sort_by(|a, b| compare_specificity(&a.pattern, &b.pattern));

        Ok(Self {
            routes,
            discovery,
            breakers,
            events,
        })
    }

    /// Launches canary evaluation timers. Idempotent.
    pub fn start(&self) {
        for route in &self.routes {
            if let Some(engine) = &route.canary {
                engine.start();
            }
        }
    }

    /// Stops canary timers and closes the discovery client. Idempotent.
    pub async fn stop(&self) {
        for route in &self.routes {
            if let Some(engine) = &route.canary {
                engine.stop();
            }
        }
        self.discovery.close().await;
    }

    /// The specificity-sorted route runtimes.
    pub fn routes(&self) -> &[Arc<RouteRuntime>] {
        &self.routes
    }

    /// Looks up a route runtime by its configured pattern.
    pub fn route(&self, path_pattern: &str) -> Option<&Arc<RouteRuntime>> {
        self.routes
            .iter()
            .find(|route| route.pattern.raw() == path_pattern)
    }

    /// State of every registered circuit breaker: `(name, state, failures)`.
    pub fn breaker_states(&self) -> Vec<(String, crate::services::circuit_breaker::CircuitState, u64)> {
        self.breakers.states()
    }

    /// Status payloads for the metrics surface.
    pub fn route_statuses(&self) -> Vec<RouteStatus> {
        self.routes
            .iter()
            .map(|route| RouteStatus {
                path: route.path().to_string(),
                service: route.service_name().to_string(),
                metrics: route.metrics.snapshot(),
                versions: route.version_snapshots(),
                canary: route.canary.as_ref().map(CanaryEngine::status),
            })
            .collect()
    }

    /// Handles one request end to end, always producing a response.
    pub async fn handle(&self, request: GatewayRequest) -> HttpResponse {
        let route = match self
            .routes
            .iter()
            .find(|route| route.pattern.matches(&request.path).is_some())
        {
            Some(route) => route.clone(),
            None => {
                debug!("No route matches {}", request.path);
                return GatewayError::RouteNotFound {
                    path: request.path.clone(),
                }
                .error_response();
            }
        };

        if !route.definition.allows_method(request.method.as_str()) {
            return GatewayError::MethodNotAllowed {
                method: request.method.to_string(),
                path: request.path.clone(),
            }
            .error_response();
        }

        let started = Instant::now();
        let (result, version) = self.dispatch(&route, &request).await;
        let elapsed = started.elapsed();

        self.record(&route, version.as_deref(), &result, elapsed);

        if let Some(mirror) = &route.mirror {
            mirror.fire(&request).await;
        }

        match result {
            Ok(response) => response.into_http_response(),
            Err(error) => {
                self.emit_error_events(&route, &error);
                error.error_response()
            }
        }
    }

    /// Chooses the dispatch path for a route: canary, version routing, or
    /// direct forwarding. Returns the outcome plus the version tag used.
    async fn dispatch(
        &self,
        route: &Arc<RouteRuntime>,
        request: &GatewayRequest,
    ) -> (Result<GatewayResponse, GatewayError>, Option<String>) {
        if let Some(engine) = &route.canary {
            let target = engine.select_version();
            let version = engine.version_of(target).to_string();

            let started = Instant::now();
            let result = route
                .proxy
                .forward_to_version(request, &version, None)
                .await;
            let elapsed = started.elapsed();

            Self::record_canary(engine, target, &result, elapsed);
            return (result, Some(version));
        }

        if let Some(router) = &route.version_router {
            if let Some(resolution) = router.resolve(request) {
                let filter = router
                    .version_entry(&resolution.version)
                    .and_then(|entry| entry.filter.clone());

                let result = route
                    .proxy
                    .forward_to_version(request, &resolution.version, filter.as_ref())
                    .await;
                return (result, Some(resolution.version));
            }
            // No explicit version and no sampling weight: fall through to
            // the unversioned instance pool.
        }

        (route.proxy.forward(request).await, None)
    }

    /// Feeds a dispatch outcome into the canary engine's per-target window.
    ///
    /// Upstream 4xx responses count as successes: they are attributed to
    /// the client, not to the canary version. Rate-limit rejections never
    /// reached a version, so they record nothing.
    fn record_canary(
        engine: &CanaryEngine,
        target: CanaryTarget,
        result: &Result<GatewayResponse, GatewayError>,
        elapsed: Duration,
    ) {
        match result {
            Ok(response) if response.is_server_error() => {
                engine.record_failure(target, elapsed, Some("upstream 5xx response"));
            }
            Ok(_) => engine.record_success(target, elapsed),
            Err(GatewayError::RateLimitExceeded { .. }) => {}
            Err(error) => engine.record_failure(target, elapsed, Some(&error.to_string())),
        }
    }

    /// Records the outcome in route-level (and version-tagged) metrics.
    fn record(
        &self,
        route: &Arc<RouteRuntime>,
        version: Option<&str>,
        result: &Result<GatewayResponse, GatewayError>,
        elapsed: Duration,
    ) {
        match result {
            Ok(response) if response.is_server_error() => {
                route.record_tagged(version, false, elapsed, Some("upstream 5xx response"));
            }
            Ok(_) => route.record_tagged(version, true, elapsed, None),
            Err(GatewayError::RateLimitExceeded { .. }) => {}
            Err(error) => route.record_tagged(version, false, elapsed, Some(&error.to_string())),
        }
    }

    fn emit_error_events(&self, route: &Arc<RouteRuntime>, error: &GatewayError) {
        match error {
            GatewayError::RateLimitExceeded { retry_after_ms } => {
                self.events.emit(
                    GatewayEvent::new(
                        EventKind::RateLimitExceeded,
                        route.path(),
                        route.service_name(),
                    )
                    .with_data(json!({ "retry_after_ms": retry_after_ms })),
                );
            }
            GatewayError::UpstreamTimeout { timeout_ms, .. } => {
                self.events.emit(
                    GatewayEvent::new(EventKind::RouteTimeout, route.path(), route.service_name())
                        .with_data(json!({ "timeout_ms": timeout_ms })),
                );
                self.emit_route_error(route, error);
            }
            _ => self.emit_route_error(route, error),
        }
    }

    fn emit_route_error(&self, route: &Arc<RouteRuntime>, error: &GatewayError) {
        self.events.emit(
            GatewayEvent::new(EventKind::RouteError, route.path(), route.service_name())
                .with_data(json!({ "error": error.to_string() })),
        );
    }
}

/// Actix entry point: every unmatched request funnels through the gateway.
pub async fn dispatch(
    req: HttpRequest,
    body: web::Bytes,
    gateway: web::Data<Arc<GatewayService>>,
) -> HttpResponse {
    let request = GatewayRequest::from_actix(&req, body);
    gateway.handle(request).await
}

/// Registers the gateway dispatcher as the application's default service.
pub fn configure_gateway(cfg: &mut web::ServiceConfig, gateway: Arc<GatewayService>) {
    cfg.app_data(web::Data::new(gateway))
        .default_service(web::route().to(dispatch));
}
