//! Run Cancellation
//!
//! A single shared signal with exactly two states, Active and Cancelled.
//! The transition happens once (deadline, interrupt or setup abort) and
//! is never reversed. Waiting on the token is interruptible, so sleeping
//! threads wake up as soon as the run is cancelled.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The configured duration elapsed
    Deadline,
    /// An external stop request (Ctrl-C, caller)
    Interrupt,
    /// The harness could not finish starting its threads
    Aborted,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => write!(f, "deadline reached"),
            Self::Interrupt => write!(f, "interrupted"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<CancelReason>>,
    wakeup: Condvar,
}

/// Shared cancellation signal.
///
/// Cloning is cheap and every clone observes the same state.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use burnin::{CancelReason, CancellationToken};
///
/// let token = CancellationToken::new();
/// let remote = token.clone();
///
/// assert!(remote.cancel(CancelReason::Interrupt));
/// assert!(!remote.cancel(CancelReason::Deadline));
///
/// // Returns immediately once cancelled
/// assert!(token.wait_timeout(Duration::from_secs(60)));
/// assert_eq!(token.reason(), Some(CancelReason::Interrupt));
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new token in the Active state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                reason: Mutex::new(None),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Returns true once the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the token.
    ///
    /// Returns true if this call performed the transition, false if the
    /// token was already cancelled (the first reason is kept).
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let mut guard = self.lock_reason();
        if guard.is_some() {
            return false;
        }

        *guard = Some(reason);
        self.inner.cancelled.store(true, Ordering::Release);
        drop(guard);

        self.inner.wakeup.notify_all();
        true
    }

    /// Returns the reason of the first cancellation, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        *self.lock_reason()
    }

    /// Blocks for up to `timeout` or until the token is cancelled.
    ///
    /// Returns true if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.lock_reason();

        // Durations too large for Instant arithmetic wait without a deadline
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while guard.is_none() {
                guard = self
                    .inner
                    .wakeup
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            return true;
        };

        while guard.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            let (next, _) = self
                .inner
                .wakeup
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }

        true
    }

    fn lock_reason(&self) -> MutexGuard<'_, Option<CancelReason>> {
        self.inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_token_starts_active() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);
    }

    #[test]
    fn test_cancel_is_one_way() {
        let token = CancellationToken::new();

        assert!(token.cancel(CancelReason::Deadline));
        assert!(token.is_cancelled());

        assert!(!token.cancel(CancelReason::Interrupt));
        assert_eq!(token.reason(), Some(CancelReason::Deadline));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();

        clone.cancel(CancelReason::Interrupt);
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::Interrupt));
    }

    #[test]
    fn test_wait_timeout_expires() {
        let token = CancellationToken::new();
        let start = Instant::now();

        assert!(!token.wait_timeout(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_timeout_wakes_on_cancel() {
        let token = CancellationToken::new();
        let remote = token.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel(CancelReason::Interrupt);
        });

        let start = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(5));

        handle.join().unwrap();
    }

    #[test]
    fn test_wait_on_cancelled_token_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel(CancelReason::Deadline);

        let start = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_with_unbounded_timeout() {
        let token = CancellationToken::new();
        let remote = token.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel(CancelReason::Interrupt);
        });

        assert!(token.wait_timeout(Duration::MAX));
        handle.join().unwrap();
    }

    #[test]
    fn test_concurrent_cancel_single_winner() {
        let token = CancellationToken::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = token.clone();
                thread::spawn(move || t.cancel(CancelReason::Interrupt))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(CancelReason::Deadline.to_string(), "deadline reached");
        assert_eq!(CancelReason::Interrupt.to_string(), "interrupted");
        assert_eq!(CancelReason::Aborted.to_string(), "aborted");
    }
}
