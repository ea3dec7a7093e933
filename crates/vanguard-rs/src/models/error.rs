//! Gateway error kinds and their HTTP edge mapping.
//!
//! Every failure mode the gateway itself produces is a distinct variant;
//! upstream responses (including 4xx and 5xx) are never converted into
//! errors; they are forwarded verbatim and only counted in metrics.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;

/// Errors produced by the gateway while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No configured route pattern matched the request path.
    #[error("No route matches path {path}")]
    RouteNotFound {
        /// The requested path
        path: String,
    },

    /// The route matched but does not allow the request method.
    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    /// The route's rate limiter rejected the request.
    #[error("Rate limit exceeded, retry in {retry_after_ms}ms")]
    RateLimitExceeded {
        /// Time until the window frees a slot
        retry_after_ms: u64,
    },

    /// Discovery returned no instance satisfying the route's filter.
    #[error("No healthy instances available for service {service}")]
    NoInstances { service: String },

    /// The service's shared circuit breaker is open.
    #[error("Circuit breaker open for service {service}")]
    CircuitOpen { service: String },

    /// The upstream call exceeded the configured deadline.
    #[error("Upstream call to {service} timed out after {timeout_ms}ms")]
    UpstreamTimeout { service: String, timeout_ms: u64 },

    /// Transport-level failure talking to the upstream instance.
    #[error("Upstream error from {service}: {message}")]
    Upstream { service: String, message: String },

    /// Invalid gateway configuration detected at runtime.
    #[error("Gateway configuration error: {message}")]
    Config { message: String },
}

impl GatewayError {
    /// Whether the retry policy may re-attempt after this error.
    ///
    /// Only transport failures and timeouts are transient; circuit-open and
    /// no-instances outcomes would fail identically on every attempt within
    /// the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Upstream { .. } | GatewayError::UpstreamTimeout { .. }
        )
    }

    /// The service name this error is attributed to, when applicable.
    pub fn service(&self) -> Option<&str> {
        match self {
            GatewayError::NoInstances { service }
            | GatewayError::CircuitOpen { service }
            | GatewayError::UpstreamTimeout { service, .. }
            | GatewayError::Upstream { service, .. } => Some(service),
            _ => None,
        }
    }
}

impl actix_web::error::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::NoInstances { .. }
            | GatewayError::CircuitOpen { .. }
            | GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            GatewayError::RouteNotFound { path } => HttpResponse::NotFound().json(json!({
                "error": "No matching gateway route",
                "path": path,
            })),
            GatewayError::MethodNotAllowed { method, path } => {
                HttpResponse::MethodNotAllowed().json(json!({
                    "error": "Method not allowed",
                    "message": self.to_string(),
                    "method": method,
                    "path": path,
                }))
            }
            GatewayError::RateLimitExceeded { retry_after_ms } => {
                let retry_after_secs = retry_after_ms.div_ceil(1000);
                HttpResponse::TooManyRequests()
                    .insert_header(("Retry-After", retry_after_secs.to_string()))
                    .json(json!({
                        "error": "Rate limit exceeded",
                        "message": self.to_string(),
                        "retry_after_ms": retry_after_ms,
                    }))
            }
            GatewayError::UpstreamTimeout { service, .. } => {
                HttpResponse::GatewayTimeout().json(json!({
                    "error": "Gateway Timeout",
                    "message": self.to_string(),
                    "service": service,
                }))
            }
            GatewayError::NoInstances { service }
            | GatewayError::CircuitOpen { service }
            | GatewayError::Upstream { service, .. } => HttpResponse::BadGateway().json(json!({
                "error": "Bad Gateway",
                "message": self.to_string(),
                "service": service,
            })),
            GatewayError::Config { .. } => HttpResponse::InternalServerError().json(json!({
                "error": "Internal gateway error",
                "message": self.to_string(),
            })),
        }
    }
}
