//! Counting semaphore with multi-unit waits and timeouts.
//!
//! Built from a `Mutex` and a `Condvar`. A waiter asks for `amount` units and
//! sleeps until the count covers the whole request, then takes it in one step.
//! The logging pipeline uses one per thread buffer to count free bytes.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use minstant::Instant;

use crate::sync::Timeout;

/// Counting semaphore. The count never goes negative.
#[derive(Debug)]
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `count` units.
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            available: Condvar::new(),
        }
    }

    // The count is a plain integer that is never left half-updated, so a
    // panic elsewhere while holding the lock doesn't invalidate it.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until `amount` units are available, then takes them.
    ///
    /// Returns `false` if the timeout elapses first, leaving the count unchanged.
    /// A zero `amount` succeeds immediately.
    pub fn wait(&self, amount: usize, timeout: Timeout) -> bool {
        if amount == 0 {
            return true;
        }
        let deadline = timeout.deadline();

        let mut count = self.lock();
        while *count < amount {
            count = match deadline {
                None => self
                    .available
                    .wait(count)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return false;
                    }
                    // Recompute what's left after every (possibly spurious) wakeup
                    self.available
                        .wait_timeout(count, dl.duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        *count -= amount;
        true
    }

    /// Takes `amount` units only if they are available right now.
    #[must_use]
    pub fn try_wait(&self, amount: usize) -> bool {
        let mut count = self.lock();
        if *count < amount {
            return false;
        }
        *count -= amount;
        true
    }

    /// Returns `amount` units and wakes waiters.
    ///
    /// Every waiter is woken: requests differ in size, so the one that fits
    /// may not be the one `notify_one` would pick.
    pub fn signal(&self, amount: usize) {
        if amount == 0 {
            return;
        }
        let mut count = self.lock();
        *count += amount;
        drop(count);
        self.available.notify_all();
    }

    /// Current count. A snapshot, stale as soon as it is returned.
    #[must_use]
    pub fn available(&self) -> usize {
        *self.lock()
    }
}
