//! Bounded exponential-backoff executor for batch queries.
//!
//! Transient network failures are retried up to the attempt ceiling with a
//! doubling backoff; authentication failures and non-retriable errors fail
//! fast. The backoff sleep runs under the caller's [`RunContext`], so an
//! expired deadline interrupts it and surfaces as the timeout cause.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::core::context::RunContext;
use crate::core::errors::Result;

/// Retry envelope parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per operation, including the first
    pub max_attempts: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn normalized(&self) -> Self {
        let mut policy = self.clone();
        if policy.max_attempts == 0 {
            policy.max_attempts = 1;
        }
        if policy.initial_backoff.is_zero() {
            policy.initial_backoff = Duration::from_millis(100);
        }
        if policy.max_backoff < policy.initial_backoff {
            policy.max_backoff = policy.initial_backoff;
        }
        policy
    }
}

/// Run `op` under the retry envelope.
///
/// Retriable failures sleep and try again until the attempt ceiling;
/// authentication failures and other non-retriable errors return
/// immediately. A context that expires mid-operation or mid-sleep returns
/// the deadline cause, not the operation's error.
pub async fn execute_with_retry<T, F, Fut>(
    ctx: &RunContext,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let policy = policy.normalized();
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1u32;

    loop {
        ctx.check()?;

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        // A deadline that fired during the operation is the real cause.
        ctx.check()?;

        if err.is_auth() || !err.is_retriable() || attempt >= policy.max_attempts {
            return Err(err);
        }

        warn!(
            attempt,
            delay_ms = backoff.as_millis() as u64,
            error = %err,
            "query attempt failed, retrying after backoff"
        );

        ctx.sleep(backoff).await?;

        backoff = (backoff * 2).min(policy.max_backoff);
        attempt += 1;
    }
}
