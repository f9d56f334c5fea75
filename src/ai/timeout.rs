//! Timeout helpers
//!
//! Wraps async operations with a deadline and maps expiry to
//! [`RfpError::Timeout`]. Step executors are bounded through these helpers,
//! so a slow collaborator surfaces as an ordinary step failure.

use std::future::Future;
use std::time::Duration;

use crate::types::{Result, RfpError};

/// Execute a fallible async operation with a timeout.
///
/// ```ignore
/// let healthy = with_timeout(Duration::from_secs(5), provider.health_check(), "health check").await?;
/// ```
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(RfpError::timeout(operation_name, timeout)),
    }
}

/// Execute an async operation with a timeout, wrapping the output in `Ok`.
///
/// Used when the inner future carries its own error type.
pub async fn with_timeout_map<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(RfpError::timeout(operation_name, timeout)),
    }
}
