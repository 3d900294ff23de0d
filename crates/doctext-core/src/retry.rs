//! Bounded retry with error-kind aware recovery.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::exec::ExecContext;

/// Attempt budget and backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Delay before attempt `k + 1` is `base_delay * k`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Same base delay with a different attempt budget.
    pub fn with_attempts(self, max_attempts: u32) -> Self {
        Self::new(max_attempts, self.base_delay)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Decision returned by a recovery hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Retry after the regular backoff.
    Retry,
    /// The condition was repaired; retry immediately.
    Resolved,
    /// Stop retrying and return the error.
    GiveUp,
}

type RecoveryHook = Box<dyn Fn(&Error) -> Recovery + Send + Sync>;

/// Runs operations under a [`RetryPolicy`].
///
/// Only retryable kinds (see [`ErrorKind::is_retryable`]) are attempted
/// again; anything else is returned on the first failure. Hooks registered
/// for a kind run before each retry of an error of that kind.
pub struct RetryExecutor {
    policy: RetryPolicy,
    hooks: HashMap<ErrorKind, RecoveryHook>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            hooks: HashMap::new(),
        }
    }

    pub fn with_hook(
        mut self,
        kind: ErrorKind,
        hook: impl Fn(&Error) -> Recovery + Send + Sync + 'static,
    ) -> Self {
        self.hooks.insert(kind, Box::new(hook));
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// Backoff sleeps are interrupted by cancellation of `ctx`. Exhaustion
    /// wraps the last error with the attempt count, keeping its kind.
    pub fn run<T>(
        &self,
        ctx: &ExecContext,
        label: &str,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let max = self.policy.max_attempts;
        let mut attempt = 1;
        loop {
            ctx.check()?;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!("{} failed with non-retryable {} error", label, err.kind());
                return Err(err);
            }
            if attempt >= max {
                return Err(err.context(format!("{label} failed after {attempt} attempts")));
            }

            let backoff = match self.hooks.get(&err.kind()).map(|hook| hook(&err)) {
                Some(Recovery::GiveUp) => {
                    debug!("Recovery hook gave up on {}", label);
                    return Err(err);
                }
                Some(Recovery::Resolved) => Duration::ZERO,
                Some(Recovery::Retry) | None => self.policy.backoff(attempt),
            };

            warn!("{} failed (attempt {}/{}): {}", label, attempt, max, err);
            if !backoff.is_zero() {
                ctx.sleep(backoff)?;
            }
            attempt += 1;
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
