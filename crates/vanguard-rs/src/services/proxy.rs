//! Discovery-driven upstream forwarding wrapped in the resilience stack.
//!
//! A [`ServiceProxy`] binds a single upstream service: its discovery filter,
//! path rewrites, and resilience policies. Each forwarded request runs the
//! same pipeline:
//!
//! ```text
//! rate limit -> request transform -> deadline( breaker( retry( discover ->
//! rewrite URL -> sanitize headers -> HTTP call ) ) ) -> metrics ->
//! response transform
//! ```
//!
//! Retries run *inside* the circuit breaker so the breaker counts a whole
//! exhausted retry sequence as one failure, and the overall deadline bounds
//! every attempt.

use crate::models::error::GatewayError;
use crate::models::http::{GatewayRequest, GatewayResponse};
use crate::models::instance::{DiscoveryFilter, ServiceInstance};
use crate::models::route::LoadBalancingStrategy;
use crate::services::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::services::discovery::DiscoveryClient;
use crate::services::events::EventSink;
use crate::services::metrics::MetricsCollector;
use crate::services::rate_limit::{RateLimitConfig, RateLimiter};
use crate::services::retry::{RetryConfig, RetryPolicy};
use crate::services::timeout::with_deadline;
use crate::services::transform::TransformConfig;
use crate::utils::path::{format_upstream_url, rewrite_path};
use log::debug;
use reqwest::header::{HeaderMap as ReqwestHeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method as ReqwestMethod};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hop-by-hop headers stripped before forwarding.
///
/// Bodies are re-serialized and re-framed on the upstream connection, so
/// forwarding the client's framing headers would stall upstream reads. The
/// `host` header is rewritten to the selected instance's authority instead.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "upgrade",
    "expect",
    "host",
    "te",
    "trailer",
];

/// Static configuration for one service proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream service name in the discovery registry
    pub service_name: String,
    /// Default discovery constraints
    pub filter: DiscoveryFilter,
    /// Prefix removed from the request path
    pub strip_prefix: Option<String>,
    /// Prefix prepended to the rewritten path
    pub add_prefix: Option<String>,
    /// Instance selection strategy
    pub load_balancing: LoadBalancingStrategy,
    /// Overall per-forward deadline
    pub timeout: Duration,
    /// Retry policy; `None` disables retries
    pub retry: Option<RetryConfig>,
    /// Admission limits; `None` disables rate limiting
    pub rate_limit: Option<RateLimitConfig>,
    /// Circuit breaker parameters for this service
    pub circuit_breaker: CircuitBreakerConfig,
    /// Outbound request header rewrites
    pub request_transform: Option<TransformConfig>,
    /// Inbound response header rewrites
    pub response_transform: Option<TransformConfig>,
    /// Metrics retention window
    pub metrics_window: Duration,
}

/// Forwards requests to one upstream service under the resilience stack.
///
/// Cloning is cheap; clones share the HTTP connection pool, the circuit
/// breaker, the rate limiter, and the metrics window.
#[derive(Clone)]
pub struct ServiceProxy {
    config: Arc<ProxyConfig>,
    client: Client,
    discovery: Arc<dyn DiscoveryClient>,
    breaker: Arc<CircuitBreaker>,
    rate_limiter: Option<Arc<RateLimiter>>,
    retry: RetryPolicy,
    metrics: MetricsCollector,
}

impl ServiceProxy {
    /// Creates a proxy for `config.service_name`.
    ///
    /// The circuit breaker is fetched from (or created in) the shared
    /// registry under `gateway:<service>`, so proxies for the same service
    /// share breaker state.
    pub fn new(
        config: ProxyConfig,
        discovery: Arc<dyn DiscoveryClient>,
        breakers: &CircuitBreakerRegistry,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .build()
            .expect("Failed to create HTTP client");

        let breaker_name = format!("gateway:{}", config.service_name);
        let breaker = breakers.get_or_create(&breaker_name, &config.circuit_breaker, events);

        let rate_limiter = config
            .rate_limit
            .as_ref()
            .map(|cfg| Arc::new(RateLimiter::new(cfg)));

        let retry = RetryPolicy::new(config.retry.clone().unwrap_or(RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        }));

        let metrics = MetricsCollector::new(config.metrics_window);

        Self {
            config: Arc::new(config),
            client,
            discovery,
            breaker,
            rate_limiter,
            retry,
            metrics,
        }
    }

    /// The upstream service this proxy is bound to.
    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    /// This proxy's sliding-window metrics.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// The shared circuit breaker protecting this service.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Forwards a request using the proxy's default filter.
    pub async fn forward(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        self.forward_filtered(request, self.config.filter.clone())
            .await
    }

    /// Forwards a request restricted to instances of the given version.
    ///
    /// The version constraint is merged into the default filter; an
    /// `extra_filter` contributes additional metadata requirements first.
    pub async fn forward_to_version(
        &self,
        request: &GatewayRequest,
        version: &str,
        extra_filter: Option<&DiscoveryFilter>,
    ) -> Result<GatewayResponse, GatewayError> {
        let mut filter = self.config.filter.clone();
        if let Some(extra) = extra_filter {
            if extra.status.is_some() {
                filter.status = extra.status;
            }
            for (key, value) in &extra.metadata {
                filter.metadata.insert(key.clone(), value.clone());
            }
        }
        let filter = filter.with_version(version);

        self.forward_filtered(request, filter).await
    }

    /// Forwards a request with the default filter replaced entirely.
    pub async fn forward_with_filter(
        &self,
        request: &GatewayRequest,
        filter: DiscoveryFilter,
    ) -> Result<GatewayResponse, GatewayError> {
        self.forward_filtered(request, filter).await
    }

    async fn forward_filtered(
        &self,
        request: &GatewayRequest,
        filter: DiscoveryFilter,
    ) -> Result<GatewayResponse, GatewayError> {
        if let Some(limiter) = &self.rate_limiter {
            if !limiter.try_acquire() {
                // Rejected before any upstream work; not a service failure,
                // so nothing is recorded in the service metrics.
                return Err(GatewayError::RateLimitExceeded {
                    retry_after_ms: limiter.retry_after_ms(),
                });
            }
        }

        let mut request = request.clone();
        if let Some(transform) = &self.config.request_transform {
            transform.apply_to_request(&mut request);
        }

        if self.breaker.try_acquire().is_err() {
            let error = GatewayError::CircuitOpen {
                service: self.config.service_name.clone(),
            };
            self.metrics
                .record_failure(Duration::ZERO, Some("circuit open"));
            return Err(error);
        }

        let started = Instant::now();
        let attempt_request = &request;
        let attempt_filter = &filter;

        let result = with_deadline(
            &self.config.service_name,
            self.config.timeout,
            self.retry
                .execute(|| self.attempt(attempt_request, attempt_filter)),
        )
        .await;

        let elapsed = started.elapsed();

        // The breaker observes the final outcome of the whole retry
        // sequence: one success or one failure per forward.
        match &result {
            Ok(response) if response.is_server_error() => {
                self.breaker.record_failure();
                self.metrics
                    .record_failure(elapsed, Some("upstream 5xx response"));
            }
            Ok(_) => {
                self.breaker.record_success();
                self.metrics.record_success(elapsed);
            }
            Err(error) => {
                self.breaker.record_failure();
                self.metrics.record_failure(elapsed, Some(&error.to_string()));
            }
        }

        let mut response = result?;
        if let Some(transform) = &self.config.response_transform {
            transform.apply_to_response(&mut response);
        }

        Ok(response)
    }

    /// One upstream attempt: discover, rewrite, sanitize, send.
    async fn attempt(
        &self,
        request: &GatewayRequest,
        filter: &DiscoveryFilter,
    ) -> Result<GatewayResponse, GatewayError> {
        let service = &self.config.service_name;

        let instance = self
            .discovery
            .get_instance(
                service,
                self.config.load_balancing,
                Some(filter),
                request.client_ip.as_deref(),
            )
            .await
            .map_err(|e| GatewayError::Upstream {
                service: service.clone(),
                message: e.to_string(),
            })?
            .ok_or_else(|| GatewayError::NoInstances {
                service: service.clone(),
            })?;

        let path = rewrite_path(
            &request.path,
            self.config.strip_prefix.as_deref(),
            self.config.add_prefix.as_deref(),
        );
        let url = format_upstream_url(&instance, &path, &request.query);
        debug!("Forwarding {} {} to {}", request.method, request.path, url);

        let method = ReqwestMethod::from_bytes(request.method.as_str().as_bytes())
            .unwrap_or(ReqwestMethod::GET);
        let headers = Self::build_upstream_headers(request, &instance);

        let outcome = self
            .client
            .request(method, &url)
            .headers(headers)
            .body(request.body.to_vec())
            .send()
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(error) => {
                self.discovery.report_outcome(service, &instance, false);
                return Err(GatewayError::Upstream {
                    service: service.clone(),
                    message: error.to_string(),
                });
            }
        };

        let status = response.status().as_u16();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(|error| {
            self.discovery.report_outcome(service, &instance, false);
            GatewayError::Upstream {
                service: service.clone(),
                message: error.to_string(),
            }
        })?;

        self.discovery
            .report_outcome(service, &instance, status < 500);

        Ok(GatewayResponse {
            status,
            headers: response_headers,
            body: actix_web::web::Bytes::from(body),
        })
    }

    /// Converts gateway headers into the outbound header map.
    ///
    /// Hop-by-hop headers are dropped, repeated values are joined with
    /// `", "`, and `host` is rewritten to the chosen instance's authority.
    fn build_upstream_headers(
        request: &GatewayRequest,
        instance: &ServiceInstance,
    ) -> ReqwestHeaderMap {
        let mut headers = ReqwestHeaderMap::with_capacity(request.headers.len() + 1);

        for (name, _) in &request.headers {
            if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
                continue;
            }
            if headers.contains_key(name.as_str()) {
                continue;
            }

            let joined = request
                .headers
                .iter()
                .filter(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
                .collect::<Vec<_>>()
                .join(", ");

            if let (Ok(header_name), Ok(header_value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&joined),
            ) {
                headers.insert(header_name, header_value);
            }
        }

        if let Ok(host) = HeaderValue::from_str(&instance.authority()) {
            headers.insert(reqwest::header::HOST, host);
        }

        headers
            .entry(reqwest::header::USER_AGENT)
            .or_insert_with(|| HeaderValue::from_static("vanguard-rs/0.3"));

        headers
    }
}
