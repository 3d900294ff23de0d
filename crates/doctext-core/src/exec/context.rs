//! Cancellable, time-bounded execution context.
//!
//! Extraction code is synchronous and runs on blocking threads. Waiting on
//! subprocesses and backoff sleeps is done on tokio, bridged with
//! [`Handle::block_on`]: the caller's runtime when the thread has one (a
//! `spawn_blocking` task), otherwise a small shared runtime owned by this
//! module.

use std::future::Future;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorKind, Result};

static FALLBACK_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Handle shared by everything working on one request.
///
/// Clones observe the same cancellation token and deadline.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// Context without a deadline.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with `Cancelled` or `Timeout` if the work should stop.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::cancelled());
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Error::timeout());
        }
        Ok(())
    }

    /// Sleep for `duration`, returning early with an error on cancellation or deadline.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        self.check()?;
        self.block_on(self.guard(tokio::time::sleep(duration)))?
    }

    /// Race `work` against cancellation and the deadline. Whichever stops
    /// the work drops its future.
    pub(crate) async fn guard<F: Future>(&self, work: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::cancelled()),
            _ = until(self.deadline) => Err(Error::timeout()),
            output = work => Ok(output),
        }
    }

    /// Drive `future` to completion from a blocking thread.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        Ok(runtime_handle()?.block_on(future))
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

fn runtime_handle() -> Result<Handle> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }
    if let Some(runtime) = FALLBACK_RUNTIME.get() {
        return Ok(runtime.handle().clone());
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("doctext-exec")
        .enable_all()
        .build()
        .map_err(|e| Error::with_source(ErrorKind::System, "failed to start async runtime", e))?;
    // A racing thread may have installed its runtime first; either one works.
    let _ = FALLBACK_RUNTIME.set(runtime);
    FALLBACK_RUNTIME
        .get()
        .map(|runtime| runtime.handle().clone())
        .ok_or_else(|| Error::system("async runtime unavailable"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sleep_completes() {
        let ctx = ExecContext::new();
        assert!(ctx.sleep(Duration::from_millis(5)).is_ok());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_cancel_interrupts_sleep() {
        let ctx = ExecContext::new();
        let canceller = ctx.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let start = Instant::now();
        let err = ctx.sleep(Duration::from_secs(30)).unwrap_err();
        handle.join().unwrap();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_deadline_expires() {
        let ctx = ExecContext::with_timeout(Duration::from_millis(10));
        let err = ctx.sleep(Duration::from_secs(30)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(ctx.check().unwrap_err().kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_cancelled_context_fails_fast() {
        let ctx = ExecContext::new();
        ctx.cancel();
        let err = ctx.sleep(Duration::from_secs(30)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sleep_inside_blocking_task() {
        let ctx = ExecContext::new();
        let worker = ctx.clone();
        let blocking = tokio::task::spawn_blocking(move || worker.sleep(Duration::from_secs(30)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        let err = blocking.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
