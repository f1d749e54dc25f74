//! Settle delays and run cancellation.
//!
//! The server commits channel and chaincode changes asynchronously, so some
//! steps wait a fixed time before dependants run. The wait goes through a
//! [`Clock`] so tests can observe it, and always honours a [`CancelToken`].
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Shared cancellation flag for one or more runs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and wake every waiter.
    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for up to `duration`. Returns true when woken by cancellation.
    ///
    /// A duration too large to represent as an instant waits until cancelled.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let (lock, condvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            let Some(deadline) = deadline else {
                cancelled = condvar
                    .wait(cancelled)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = condvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run cancelled")]
pub struct Cancelled;

/// Source of settle waits.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled>;
}

/// Wall-clock waits, interrupted by cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled> {
        if cancel.wait_timeout(duration) {
            return Err(Cancelled);
        }
        Ok(())
    }
}

/// Cancel `token` once `deadline` elapses, unless it is cancelled first.
pub fn spawn_deadline(token: CancelToken, deadline: Duration) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        if !token.wait_timeout(deadline) {
            tracing::warn!(deadline_secs = deadline.as_secs_f64(), "run deadline reached");
            token.cancel();
        }
    })
}
