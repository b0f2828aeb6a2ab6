//! Bounded retry/backoff around one supervised execution.
//!
//! This policy restarts whole worker sessions; partial-file resume within a
//! restarted session is the worker's own on-disk mechanism, selected by the
//! `-k` pass-through in the compiled spec.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::config::ResumeConfig;
use crate::{AppError, Result};

/// Attempt counter and current backoff for one supervised execution.
///
/// Scoped to a single session run; never persisted.
#[derive(Debug, Clone)]
pub struct ResumeContext {
    attempt: u32,
    remaining_retries: u32,
    backoff: Duration,
    max_backoff: Duration,
}

impl ResumeContext {
    /// Start a fresh context from the policy parameters.
    #[must_use]
    pub fn new(policy: &ResumeConfig) -> Self {
        Self {
            attempt: 0,
            remaining_retries: policy.max_attempts.saturating_sub(1),
            backoff: policy.initial_backoff(),
            max_backoff: policy.max_backoff(),
        }
    }

    /// Attempts made so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Backoff that will precede the next retry.
    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Double the backoff, capped at the ceiling.
    pub fn advance_backoff(&mut self) {
        self.backoff = (self.backoff * 2).min(self.max_backoff);
    }
}

/// Run `op` under the resume policy until success or a terminal failure.
///
/// Retryable failures sleep the current backoff, double it up to the
/// ceiling, and consume one retry; running out raises
/// [`AppError::RetriesExhausted`]. A fatal failure is tolerated only when it
/// is the very first attempt of the execution, where it is retried exactly
/// once; fatal on any later attempt aborts immediately.
///
/// # Errors
///
/// Returns the fatal error, or `AppError::RetriesExhausted` carrying the
/// last retryable error's description.
pub async fn with_resume<F, Fut, T>(policy: &ResumeConfig, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut ctx = ResumeContext::new(policy);
    loop {
        ctx.attempt += 1;
        let attempt = ctx.attempt;
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let fatal = !err.is_retryable();
        if fatal && attempt > 1 {
            warn!(label, attempt, code = err.code(), %err, "fatal failure, aborting session");
            return Err(err);
        }
        if !fatal {
            if ctx.remaining_retries == 0 {
                return Err(AppError::RetriesExhausted(format!(
                    "max retries exceeded after {attempt} attempts: {err}"
                )));
            }
            ctx.remaining_retries -= 1;
        }

        warn!(
            label,
            attempt,
            code = err.code(),
            backoff_secs = ctx.backoff.as_secs(),
            %err,
            "session attempt failed, retrying"
        );
        sleep(ctx.backoff).await;
        ctx.advance_backoff();
    }
}
