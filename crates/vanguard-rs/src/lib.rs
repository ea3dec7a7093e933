//! # vanguard-rs
//!
//! An intelligent API gateway library: pattern-based routing over a service
//! discovery registry, a layered resilience stack (rate limiting, timeouts,
//! circuit breaking, retries), version-aware dispatch, traffic mirroring,
//! and automated progressive canary delivery driven by sliding-window
//! metrics.
//!
//! # Architecture
//!
//! ```text
//! Client -> GatewayService -> RouteRuntime -> (CanaryEngine | VersionRouter | direct)
//!        -> ServiceProxy -> rate limit -> deadline(breaker(retry(discovery -> HTTP)))
//!        -> Upstream
//! ```
//!
//! The [`routes::http::GatewayService`] is built from declarative
//! [`models::settings::GatewaySettings`], wired to a
//! [`services::discovery::DiscoveryClient`] and an
//! [`services::events::EventSink`], and mounted as the host HTTP server's
//! default service.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vanguard_rs::config::settings::load_settings;
//! use vanguard_rs::routes::http::GatewayService;
//! use vanguard_rs::services::discovery::InMemoryRegistry;
//! use vanguard_rs::services::events::LogEventSink;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = load_settings()?;
//! settings.validate()?;
//!
//! let registry = Arc::new(InMemoryRegistry::with_services(
//!     settings.discovery.services.clone(),
//! ));
//! let gateway = Arc::new(GatewayService::from_settings(
//!     &settings,
//!     registry,
//!     Arc::new(LogEventSink),
//! )?);
//! gateway.start();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logs;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;
