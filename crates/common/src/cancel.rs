//! Cancellation tokens shared across suspension points
//!
//! A token is cancelled either explicitly or by reaching its deadline. Timeout
//! based entry points build a token with a deadline and hand it to the
//! cancellable code path, so cancellation and timeouts fail the same way.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Why a cancellable operation stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    #[error("operation was cancelled")]
    Cancelled,

    #[error("operation deadline elapsed")]
    DeadlineElapsed,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cancellation token for cooperative cancellation of async operations.
///
/// Clones share cancellation state. A token may additionally carry a
/// deadline, after which it reports [`Interrupted::DeadlineElapsed`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Create a token that only fires when cancelled explicitly
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that fires once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::default(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Create a token that fires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::default(),
            deadline: Some(deadline),
        }
    }

    /// Derive a token sharing this token's cancellation state, bounded by
    /// whichever deadline comes first
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let child_deadline = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, child_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            inner: self.inner.clone(),
            deadline,
        }
    }

    /// The deadline of this token, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Request cancellation; every clone observes it
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether the token has been cancelled or its deadline has passed
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Return an error if the token has fired
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return Err(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupted::DeadlineElapsed),
            _ => Ok(()),
        }
    }

    /// Wait until the token fires
    pub async fn cancelled(&self) -> Interrupted {
        loop {
            // Register before checking so a concurrent cancel() is not missed
            let notified = self.inner.notify.notified();

            if let Err(reason) = self.check() {
                return reason;
            }

            match self.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => continue,
                        _ = tokio::time::sleep_until(deadline) => {
                            return Interrupted::DeadlineElapsed;
                        }
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Race `future` against this token
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Interrupted> {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(reason),
            output = future => Ok(output),
        }
    }
}
