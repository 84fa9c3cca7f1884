//! Bounded fixed-backoff retry

use crate::error::{ClientError, ClientResult};
use std::future::Future;
use std::time::Duration;

/// 重试策略：固定次数 + 固定间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Single attempt, no retry
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Run `op` until it succeeds, `should_retry` rejects the error, or the
/// attempts are exhausted. The last error is returned unchanged.
pub async fn with_retry<T, F, Fut, P>(
    policy: RetryPolicy,
    op_name: &'static str,
    should_retry: P,
    mut op: F,
) -> ClientResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ClientResult<T>>,
    P: Fn(&ClientError) -> bool,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(op = op_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < policy.max_attempts && should_retry(&e) => {
                tracing::warn!(
                    op = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
