//! Synchronization primitives for in-process communication.
//!
//! This module provides the thread-safe bounded queues and the semaphores the
//! logging pipeline is built on.

pub mod mpmc;
pub mod os_semaphore;
pub mod semaphore;
pub mod spmc;
pub mod spsc;

use std::time::Duration;

use minstant::Instant;

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl Timeout {
    /// Absolute deadline for this timeout, measured from now.
    ///
    /// A duration too long for the clock to represent means no deadline.
    pub(crate) fn deadline(self) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            // minstant truncates the nanosecond count to u64 before adding
            Self::Duration(d) if u64::try_from(d.as_nanos()).is_err() => None,
            Self::Duration(d) => Instant::now().checked_add(d),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

/// Returns `true` once `deadline` has passed; never for an infinite wait.
#[inline]
pub(crate) fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|dl| Instant::now() > dl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrepresentable_duration_has_no_deadline() {
        assert!(Timeout::Infinite.deadline().is_none());
        assert!(Timeout::Duration(Duration::MAX).deadline().is_none());
        assert!(
            Timeout::Duration(Duration::from_secs(u64::MAX))
                .deadline()
                .is_none()
        );
        assert!(!expired(Timeout::Duration(Duration::MAX).deadline()));
    }

    #[test]
    fn test_short_duration_expires() {
        let deadline = Timeout::Duration(Duration::from_millis(1)).deadline();
        assert!(deadline.is_some());
        std::thread::sleep(Duration::from_millis(5));
        assert!(expired(deadline));
    }

    #[test]
    fn test_huge_timeouts_succeed_when_ready() {
        let sem = semaphore::Semaphore::new(1);
        assert!(sem.wait(1, Timeout::Duration(Duration::MAX)));

        let (producer, consumer) = spsc::channel::<u8>(2);
        let forever = Timeout::Duration(Duration::from_secs(u64::MAX));
        assert_eq!(producer.push_blocking(7, forever), Ok(()));
        assert_eq!(consumer.pop_blocking(forever), Some(7));

        let (producer, consumer) = spmc::channel::<u8>(2);
        producer.push(9).unwrap();
        assert_eq!(consumer.pop_blocking(forever), Some(9));
    }
}
