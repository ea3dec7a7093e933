//! Deadline enforcement for upstream calls.
//!
//! The wrapper races a future against a deadline; on expiry the inner future
//! is dropped, which cancels any in-flight HTTP request, and the call fails
//! with [`GatewayError::UpstreamTimeout`]. Nested deadlines compose with
//! innermost-wins semantics because the inner future completes (with its own
//! timeout error) before the outer deadline can fire.

use crate::models::error::GatewayError;
use std::future::Future;
use tokio::time::{timeout, Duration};

/// Runs `operation` under a deadline attributed to `service`.
pub async fn with_deadline<T, Fut>(
    service: &str,
    deadline: Duration,
    operation: Fut,
) -> Result<T, GatewayError>
where
    Fut: Future<Output = Result<T, GatewayError>>,
{
    match timeout(deadline, operation).await {
        Ok(outcome) => outcome,
        Err(_) => Err(GatewayError::UpstreamTimeout {
            service: service.to_string(),
            timeout_ms: deadline.as_millis() as u64,
        }),
    }
}
