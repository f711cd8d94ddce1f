//! Cancellation token and bounded waits.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cloneable cancellation flag with interruptible waits.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation and wakes every waiter.
    pub fn cancel(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `timeout` or until cancelled.
    ///
    /// Returns true if cancellation was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = condvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *cancelled
    }
}

/// Runs a one-tick-per-second countdown of `total`, calling `on_tick` with
/// the seconds elapsed before each wait.
///
/// Returns false if cancelled before completion.
pub fn countdown(total: Duration, cancel: &CancellationToken, mut on_tick: impl FnMut(u64)) -> bool {
    let mut remaining = total;
    let mut elapsed = 0;
    while !remaining.is_zero() {
        on_tick(elapsed);
        let step = remaining.min(Duration::from_secs(1));
        if cancel.wait_timeout(step) {
            return false;
        }
        remaining -= step;
        elapsed += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out() {
        let token = CancellationToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(10)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(60)));

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_zero_countdown_completes_without_ticks() {
        let token = CancellationToken::new();
        let mut ticks = 0;
        assert!(countdown(Duration::ZERO, &token, |_| ticks += 1));
        assert_eq!(ticks, 0);
    }

    #[test]
    fn test_cancelled_countdown_stops() {
        let token = CancellationToken::new();
        token.cancel();
        let mut ticks = Vec::new();
        assert!(!countdown(Duration::from_secs(10), &token, |t| ticks.push(t)));
        assert_eq!(ticks, vec![0]);
    }

    #[test]
    fn test_short_countdown_ticks_once() {
        let token = CancellationToken::new();
        let mut ticks = Vec::new();
        assert!(countdown(Duration::from_millis(5), &token, |t| ticks.push(t)));
        assert_eq!(ticks, vec![0]);
    }
}
