//! Logging setup for the gateway.

pub mod logger;
