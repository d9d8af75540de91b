//! Cooperative cancellation and deadline propagation for a single run.
//!
//! A [`RunContext`] is a cheap, cloneable handle carrying a shared cancel
//! flag and an optional monotonic deadline. Child contexts derived with
//! [`RunContext::with_timeout`] tighten the deadline but share the cancel
//! flag, so cancelling the root deterministically interrupts every in-flight
//! sleep and wrapped future.
//!
//! When both a deadline and a cancellation are pending, the deadline wins:
//! callers observe `SpectreError::Timeout` as the cause, never a generic
//! cancel.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::core::errors::{Result, SpectreError};

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    notify: Notify,
}

/// Cancellable context with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancel: Arc<CancelState>,
    deadline: Option<Instant>,
}

impl RunContext {
    /// Create a new root context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child context whose deadline is the earlier of the parent's
    /// deadline and `now + timeout`. A non-positive timeout leaves the
    /// parent's deadline in place.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            return self.clone();
        }

        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) => Some(existing.min(candidate)),
            None => Some(candidate),
        };

        Self {
            cancel: Arc::clone(&self.cancel),
            deadline,
        }
    }

    /// Request cancellation. Wakes every pending sleep and wrapped future.
    pub fn cancel(&self) {
        self.cancel.flag.store(true, Ordering::Relaxed);
        self.cancel.notify.notify_waiters();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.flag.load(Ordering::Relaxed)
    }

    /// Time remaining until the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Return an error if the context is expired or cancelled.
    ///
    /// An elapsed deadline is reported ahead of a cancellation so the cause
    /// stays the deadline.
    pub fn check(&self) -> Result<()> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SpectreError::timeout("run context deadline elapsed"));
            }
        }
        if self.is_cancelled() {
            return Err(SpectreError::Cancelled);
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early on deadline expiry or cancellation.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.check()?;
        if duration.is_zero() {
            return Ok(());
        }

        let cancelled = self.cancelled();
        tokio::pin!(cancelled);

        tokio::select! {
            biased;
            () = self.deadline_elapsed() => Err(SpectreError::timeout("run context deadline elapsed")),
            () = &mut cancelled => Err(SpectreError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the deadline fires or the context is
    /// cancelled first. Used to make otherwise-uninterruptible I/O calls obey
    /// the context.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let cancelled = self.cancelled();
        tokio::pin!(cancelled);
        tokio::pin!(fut);

        tokio::select! {
            biased;
            () = self.deadline_elapsed() => Err(SpectreError::timeout("run context deadline elapsed")),
            () = &mut cancelled => Err(SpectreError::Cancelled),
            result = &mut fut => result,
        }
    }

    async fn deadline_elapsed(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    async fn cancelled(&self) {
        // Register interest before checking the flag to avoid a lost wakeup.
        let notified = self.cancel.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_deadline() {
        let ctx = RunContext::new();
        assert!(ctx.sleep(Duration::from_millis(100)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_interrupted_by_deadline_reports_timeout() {
        let ctx = RunContext::new().with_timeout(Duration::from_millis(50));
        let err = ctx.sleep(Duration::from_secs(10)).await.unwrap_err();
        assert!(err.is_deadline(), "expected deadline cause, got {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_wins_over_cancellation() {
        let ctx = RunContext::new().with_timeout(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        let err = ctx.check().unwrap_err();
        assert!(err.is_deadline(), "deadline must be the reported cause");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let ctx = RunContext::new();
        let child = ctx.clone();

        let handle = tokio::spawn(async move { child.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        ctx.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(SpectreError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn child_deadline_tightens_but_never_loosens() {
        let parent = RunContext::new().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(300));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(child.check().unwrap_err().is_deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn run_wraps_future_with_deadline() {
        let ctx = RunContext::new().with_timeout(Duration::from_millis(20));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(42u32)
            })
            .await
            .unwrap_err();
        assert!(err.is_deadline());
    }
}
