//! Lock-free SPMC queue: one producer, any number of consumers.
//!
//! Each pushed item is delivered to exactly one consumer. Items leave the
//! queue in push order, but consumers racing each other see no global order
//! among their respective deliveries.
//!
//! # Example
//!
//! ```
//! use spool::sync::spmc;
//!
//! let (producer, consumer) = spmc::channel::<u32>(4);
//! let worker = consumer.clone();
//!
//! producer.push(7).unwrap();
//! producer.push(8).unwrap();
//! assert_eq!(worker.pop(), Some(7));
//! assert_eq!(consumer.pop(), Some(8));
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::spmc::ring::Ring;
use crate::sync::{Timeout, expired};

/// Write end. `Send` but not `Sync`, and not `Clone`: there is exactly one.
pub struct Producer<T: Copy + Send> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomData<Cell<&'static ()>>,
}

/// Read end. Clone it to add consumers; clones may be used concurrently.
pub struct Consumer<T: Copy + Send> {
    ring: Arc<Ring<T>>,
}

impl<T: Copy + Send> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
        }
    }
}

/// Creates a new SPMC channel holding `2^capacity_log2` items.
///
/// # Panics
///
/// Panics if `capacity_log2` exceeds [`crate::ring::MAX_CAPACITY_LOG2`].
#[must_use]
pub fn channel<T: Copy + Send>(capacity_log2: u32) -> (Producer<T>, Consumer<T>) {
    let ring = Arc::new(Ring::new(capacity_log2));
    (
        Producer {
            ring: Arc::clone(&ring),
            _unsync: PhantomData,
        },
        Consumer { ring },
    )
}

impl<T: Copy + Send> Producer<T> {
    /// Attempts to push an item (wait-free).
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full.
    #[inline]
    pub fn push(&self, item: T) -> Result<(), T> {
        // SAFETY: the single Producer is !Sync and !Clone.
        unsafe { self.ring.push(item) }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<T: Copy + Send> Consumer<T> {
    /// Attempts to claim one item (lock-free; retries internally on contention).
    #[inline]
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        self.ring.pop()
    }

    /// Spins until an item is claimed or the timeout elapses.
    #[must_use]
    pub fn pop_blocking(&self, timeout: Timeout) -> Option<T> {
        let deadline = timeout.deadline();
        loop {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if expired(deadline) {
                return None;
            }
            std::hint::spin_loop();
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_full_then_drain() {
        let (producer, consumer) = channel::<u8>(2);
        for b in 1..=4 {
            assert!(producer.push(b).is_ok());
        }
        assert_eq!(producer.push(5), Err(5));
        assert_eq!(consumer.len(), 4);

        let other = consumer.clone();
        assert_eq!(consumer.pop(), Some(1));
        assert_eq!(other.pop(), Some(2));
        assert!(producer.push(5).is_ok());
        assert_eq!(other.pop(), Some(3));
        assert_eq!(consumer.pop(), Some(4));
        assert_eq!(consumer.pop(), Some(5));
        assert!(other.is_empty());
    }

    #[test]
    fn test_pop_blocking_timeout() {
        let (_producer, consumer) = channel::<u64>(1);
        assert_eq!(
            consumer.pop_blocking(Duration::from_millis(2).into()),
            None
        );
    }

    #[test]
    fn test_pop_blocking_receives_from_other_thread() {
        let (producer, consumer) = channel::<u64>(1);
        let waiter = std::thread::spawn(move || consumer.pop_blocking(Timeout::Infinite));
        std::thread::sleep(Duration::from_millis(10));
        producer.push(99).unwrap();
        assert_eq!(waiter.join().unwrap(), Some(99));
    }
}
