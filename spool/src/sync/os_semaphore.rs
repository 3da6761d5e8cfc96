//! Lightweight single-unit counting semaphore.
//!
//! [`RawSemaphore`] is for places that only ever move one unit at a time and
//! never need a timeout. On Linux it is an atomic counter parked on a futex
//! (via `rustix`), so an uncontended `signal`/`wait` pair never enters the
//! kernel. Other platforms fall back to a mutex and condition variable.

pub use imp::RawSemaphore;

#[cfg(target_os = "linux")]
mod imp {
    use std::sync::atomic::{AtomicU32, Ordering};

    use rustix::io::Errno;
    use rustix::thread::futex;

    use crate::trace::warn;

    /// Counting semaphore backed by a futex word.
    #[derive(Debug)]
    pub struct RawSemaphore {
        count: AtomicU32,
        /// Threads currently parked (or about to park) on `count`.
        sleepers: AtomicU32,
    }

    impl RawSemaphore {
        #[must_use]
        pub const fn new(count: u32) -> Self {
            Self {
                count: AtomicU32::new(count),
                sleepers: AtomicU32::new(0),
            }
        }

        /// Takes one unit if available without blocking.
        #[must_use]
        pub fn try_wait(&self) -> bool {
            let mut current = self.count.load(Ordering::Relaxed);
            while current > 0 {
                match self.count.compare_exchange_weak(
                    current,
                    current - 1,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return true,
                    Err(actual) => current = actual,
                }
            }
            false
        }

        /// Blocks until a unit is available, then takes it.
        pub fn wait(&self) {
            loop {
                if self.try_wait() {
                    return;
                }
                self.sleepers.fetch_add(1, Ordering::SeqCst);
                // The kernel re-checks `count == 0` atomically with queueing us,
                // so a signal between try_wait and here can't be lost.
                if let Err(err) = futex::wait(&self.count, futex::Flags::PRIVATE, 0, None)
                    && err != Errno::AGAIN
                    && err != Errno::INTR
                {
                    warn!(error = %err, "futex wait failed");
                }
                self.sleepers.fetch_sub(1, Ordering::SeqCst);
            }
        }

        /// Adds one unit and wakes a sleeper if there is one.
        pub fn signal(&self) {
            // SeqCst pairs with the sleeper registration in `wait`
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.sleepers.load(Ordering::SeqCst) > 0
                && futex::wake(&self.count, futex::Flags::PRIVATE, 1).is_err()
            {
                warn!("futex wake failed");
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::sync::{Condvar, Mutex, PoisonError};

    /// Counting semaphore backed by a mutex and condition variable.
    #[derive(Debug)]
    pub struct RawSemaphore {
        count: Mutex<u32>,
        available: Condvar,
    }

    impl RawSemaphore {
        #[must_use]
        pub const fn new(count: u32) -> Self {
            Self {
                count: Mutex::new(count),
                available: Condvar::new(),
            }
        }

        #[must_use]
        pub fn try_wait(&self) -> bool {
            let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
            if *count == 0 {
                return false;
            }
            *count -= 1;
            true
        }

        pub fn wait(&self) {
            let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
            while *count == 0 {
                count = self
                    .available
                    .wait(count)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            *count -= 1;
        }

        pub fn signal(&self) {
            *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
            self.available.notify_one();
        }
    }
}
