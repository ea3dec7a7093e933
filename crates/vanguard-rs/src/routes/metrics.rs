//! Metrics and canary management surface.
//!
//! JSON endpoints exposing per-route window metrics and canary rollout
//! status, plus manual rollout controls. These are operational endpoints,
//! not proxied routes, and are registered ahead of the gateway's default
//! service.

use crate::routes::http::GatewayService;
use actix_web::{web, HttpResponse, Result};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Per-route metrics snapshots plus circuit breaker states.
pub async fn gateway_metrics(gateway: web::Data<Arc<GatewayService>>) -> Result<HttpResponse> {
    let breakers: Vec<_> = gateway
        .breaker_states()
        .into_iter()
        .map(|(name, state, failures)| {
            json!({
                "name": name,
                "state": state,
                "failure_count": failures,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "routes": gateway.route_statuses(),
        "circuit_breakers": breakers,
    })))
}

/// Canary status for every rollout-configured route.
pub async fn canary_status(gateway: web::Data<Arc<GatewayService>>) -> Result<HttpResponse> {
    let rollouts: Vec<_> = gateway
        .routes()
        .iter()
        .filter_map(|route| {
            route.canary().map(|engine| {
                json!({
                    "route": route.path(),
                    "service": route.service_name(),
                    "status": engine.status(),
                })
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(rollouts))
}

/// Manual rollout control actions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanaryAction {
    Promote,
    Rollback,
    Pause,
    Resume,
    Reset,
}

/// Body of a canary control request.
#[derive(Debug, Deserialize)]
pub struct CanaryControl {
    /// Route pattern the rollout is attached to
    pub route: String,
    /// Action to apply
    pub action: CanaryAction,
}

/// Applies a manual control action to a route's canary engine.
pub async fn canary_control(
    gateway: web::Data<Arc<GatewayService>>,
    body: web::Json<CanaryControl>,
) -> Result<HttpResponse> {
    let Some(route) = gateway.route(&body.route) else {
        return Ok(HttpResponse::NotFound().json(json!({
            "error": "Unknown route",
            "route": body.route,
        })));
    };

    let Some(engine) = route.canary() else {
        return Ok(HttpResponse::Conflict().json(json!({
            "error": "Route has no canary configured",
            "route": body.route,
        })));
    };

    match body.action {
        CanaryAction::Promote => engine.promote(),
        CanaryAction::Rollback => engine.rollback(),
        CanaryAction::Pause => engine.pause(),
        CanaryAction::Resume => engine.resume(),
        CanaryAction::Reset => {
            engine.reset();
            engine.start();
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "route": body.route,
        "status": engine.status(),
    })))
}

/// Registers the metrics and canary management endpoints.
pub fn configure_metrics(cfg: &mut web::ServiceConfig) {
    cfg.route("/gateway/metrics", web::get().to(gateway_metrics))
        .route("/gateway/canary", web::get().to(canary_status))
        .route("/gateway/canary/control", web::post().to(canary_control));
}
