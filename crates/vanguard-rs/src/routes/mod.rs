//! HTTP surface of the vanguard-rs gateway.
//!
//! - [`http`] - The request orchestrator and default-service dispatcher
//! - [`health`] - Health probe endpoints
//! - [`metrics`] - Metrics snapshots and canary management endpoints

pub mod health;
pub mod http;
pub mod metrics;
