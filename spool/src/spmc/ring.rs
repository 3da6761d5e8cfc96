//! Core lock-free SPMC ring buffer algorithm.
//!
//! # Algorithm
//!
//! - The producer checks `tail - head < capacity`, writes the slot at `tail`,
//!   then publishes with `tail.fetch_add(1)`. Only one thread writes `tail`, so
//!   no CAS is needed on that side.
//! - A consumer loads `tail` *before* `head`. Reading in that order can only
//!   under-estimate the number of available items, so a consumer never reads
//!   past published data.
//! - The consumer copies the slot at `head` speculatively, then tries to claim
//!   it with `CAS(head, head + 1)`. If the CAS fails, another consumer took the
//!   item (and the producer may already be reusing the slot); the copy is
//!   discarded and the whole read is retried.
//!
//! A successful CAS proves `head` still equalled the slot's index, which means
//! the producer could not have started overwriting it: reuse requires `head`
//! to move past it first.
//!
//! # Safety
//!
//! [`Ring::push`] requires a single producer. [`Ring::pop`] is safe to call from
//! any number of threads.

use std::sync::atomic::Ordering;

use crate::ring::{Counter, Geometry, Slots};

/// Core SPMC ring. Invariant: `head <= tail <= head + capacity`.
pub struct Ring<T> {
    /// Next index to publish. Written by the producer only.
    tail: Counter,
    /// Next index to claim. Contended by consumers.
    head: Counter,
    slots: Slots<T>,
}

impl<T: Copy> Ring<T> {
    /// Creates an empty ring of `2^capacity_log2` cells.
    #[must_use]
    pub fn new(capacity_log2: u32) -> Self {
        Self {
            tail: Counter::default(),
            head: Counter::default(),
            slots: Slots::new(Geometry::new(capacity_log2)),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.geometry().capacity() as usize
    }

    /// Number of items in the ring. Racy snapshot, only a hint.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.saturating_sub(head) as usize
    }

    /// Attempts to push an item onto the ring.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer.
    #[inline]
    pub unsafe fn push(&self, item: T) -> Result<(), T> {
        let capacity = self.slots.geometry().capacity();
        let tail = self.tail.load(Ordering::Relaxed);
        // Acquire: consumers' copies of the slot we may reuse are complete
        let head = self.head.load(Ordering::Acquire);
        debug_assert!(tail - head <= capacity);
        if tail - head == capacity {
            return Err(item);
        }

        // SAFETY: the slot at `tail` is unpublished and every consumer that
        // claimed its previous occupant has already advanced head past it.
        unsafe { self.slots.write(tail, item) };

        self.tail.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Attempts to claim and pop one item. Safe for concurrent consumers.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        loop {
            // Tail first: under-estimate rather than over-estimate availability
            let tail = self.tail.load(Ordering::Acquire);
            let head = self.head.load(Ordering::Acquire);

            // The two loads are from different instants, so head may exceed tail
            if head >= tail {
                return None;
            }

            // SAFETY: T: Copy; the copy is only trusted after the CAS succeeds.
            let item = unsafe { self.slots.read_speculative(head) };

            if self
                .head
                .compare_exchange_weak(head, head + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: head was still ours, so the slot held the published item
                // for the whole copy.
                return Some(unsafe { item.assume_init() });
            }
            std::hint::spin_loop();
        }
    }
}

// SAFETY: Ring is Send because all fields are Send.
unsafe impl<T: Send> Send for Ring<T> {}

// SAFETY: the producer is unique by contract; consumers synchronize through
// the CAS on head, and slot contents are published with Release on tail.
unsafe impl<T: Send> Sync for Ring<T> {}
