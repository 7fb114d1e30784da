//! Load retry logic
//!
//! Retries an operation with exponential backoff while it fails with
//! [`StoreError::Retriable`], up to `max_retries` extra attempts. Fatal
//! errors and timeouts are returned immediately.

use crate::error::StoreError;
use sparkify_common::config::LoadConfig;
use std::future::Future;
use std::time::{Duration, Instant};

/// Result of a retried operation plus the attempts it took
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, StoreError>,
    pub attempts: u32,
}

/// Bound one call by `limit`, mapping expiry to [`StoreError::Timeout`]
pub async fn with_timeout<T, Fut>(limit: Duration, fut: Fut) -> Result<T, StoreError>
where
    Fut: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Run `operation`, retrying retriable failures per `policy`
///
/// Backoff starts at `initial_backoff_ms`, doubles per retry and is capped
/// at `max_backoff_ms`.
pub async fn retry_retriable<F, Fut, T>(
    operation_name: &str,
    policy: &LoadConfig,
    mut operation: F,
) -> Retried<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let start_time = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) if err.is_retriable() && attempt <= policy.max_retries => {
                let backoff = policy.backoff_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Retriable failure, will retry after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => {
                if err.is_retriable() {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Retries exhausted"
                    );
                }
                return Retried {
                    result: Err(err),
                    attempts: attempt,
                };
            }
        }
    }
}
