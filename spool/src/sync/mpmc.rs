//! Lock-free MPMC queue shared by any number of producers and consumers.
//!
//! Completed pushes, and completed pops, each happen in the order their slots
//! were reserved, whichever threads performed them.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use spool::sync::mpmc::MpmcQueue;
//!
//! let queue = Arc::new(MpmcQueue::<u64>::new(1));
//! assert!(queue.try_push(1).is_ok());
//! assert!(queue.try_push(2).is_ok());
//! assert_eq!(queue.try_push(3), Err(3));
//!
//! let q = Arc::clone(&queue);
//! let pusher = std::thread::spawn(move || q.push(3));
//! assert_eq!(queue.pop(), 1);
//! pusher.join().unwrap();
//! assert_eq!(queue.pop(), 2);
//! assert_eq!(queue.pop(), 3);
//! ```

use crate::mpmc::ring::Ring;

/// Bounded MPMC queue of `2^capacity_log2` items.
pub struct MpmcQueue<T: Copy + Send> {
    ring: Ring<T>,
}

impl<T: Copy + Send> MpmcQueue<T> {
    /// Creates an empty queue holding `2^capacity_log2` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity_log2` exceeds [`crate::ring::MAX_CAPACITY_LOG2`].
    #[must_use]
    pub fn new(capacity_log2: u32) -> Self {
        Self {
            ring: Ring::new(capacity_log2),
        }
    }

    /// Attempts to push without waiting for space.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if every slot is taken.
    #[inline]
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.ring.try_push(item)
    }

    /// Attempts to pop without waiting for an item.
    #[inline]
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        self.ring.try_pop()
    }

    /// Busy-retries [`MpmcQueue::try_push`] until it succeeds.
    pub fn push(&self, mut item: T) {
        loop {
            match self.try_push(item) {
                Ok(()) => return,
                Err(returned) => item = returned,
            }
            std::hint::spin_loop();
        }
    }

    /// Busy-retries [`MpmcQueue::try_pop`] until it succeeds.
    #[must_use]
    pub fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            std::hint::spin_loop();
        }
    }

    /// Published items not yet claimed. Racy snapshot, only a hint.
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
