//! Health probe endpoints.

use actix_web::{web, HttpResponse, Result};
use once_cell::sync::Lazy;
use serde_json::json;
use std::time::Instant;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

/// General health endpoint with version and uptime information.
pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": STARTED_AT.elapsed().as_secs(),
    })))
}

/// Readiness probe: the gateway accepts traffic once it is constructed.
pub async fn readiness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Liveness probe.
pub async fn liveness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Registers the health endpoints.
pub fn configure_health(cfg: &mut web::ServiceConfig) {
    // Touch the start instant so uptime counts from configuration time
    Lazy::force(&STARTED_AT);

    cfg.route("/health", web::get().to(health_check))
        .route("/ready", web::get().to(readiness_check))
        .route("/live", web::get().to(liveness_check));
}
