//! Core lock-free MPMC ring buffer algorithm.
//!
//! # Algorithm
//!
//! Four monotonically increasing counters split the ring into zones:
//!
//! ```text
//! +---------+-----------------+-------------+------------------+---------+
//! | unused  | pop in progress |    items    | push in progress | unused  |
//! +---------+-----------------+-------------+------------------+---------+
//!           ^                 ^             ^                  ^
//!           temp_head         head          tail               temp_tail
//! ```
//!
//! with `temp_head <= head <= tail <= temp_tail <= temp_head + capacity`.
//!
//! - A producer reserves a ticket by CAS-incrementing `temp_tail` (full when
//!   `temp_tail == temp_head + capacity`), writes its slot, then spins until
//!   `tail` equals its ticket and advances `tail` by one.
//! - A consumer reserves by CAS-incrementing `head` (empty when `head == tail`),
//!   copies its slot, then spins until `temp_head` equals its ticket and
//!   advances `temp_head` by one.
//!
//! Claiming a slot only needs a CAS; the publication step is what runs in
//! ticket order, so completed pushes and completed pops each form a total
//! order matching reservation order.
//!
//! # Progress
//!
//! The publication spin waits for every ticket ahead of it. If the thread
//! holding an earlier ticket is descheduled, later publishers wait for it;
//! there is no fairness bound beyond "the earlier ticket eventually finishes".

use std::sync::atomic::Ordering;

use crate::ring::{Counter, Geometry, Slots};

/// Spins before the publication wait starts yielding the CPU.
const SPINS_BEFORE_YIELD: u32 = 64;

/// Core MPMC ring.
pub struct Ring<T> {
    /// Consumer claim counter.
    head: Counter,
    /// Producer publication counter.
    tail: Counter,
    /// Consumer release counter.
    temp_head: Counter,
    /// Producer claim counter.
    temp_tail: Counter,
    slots: Slots<T>,
}

/// Waits until `counter == ticket`, then advances it past the ticket.
#[inline]
fn publish_in_order(counter: &Counter, ticket: u64) {
    let mut spins = 0u32;
    while counter.load(Ordering::Acquire) != ticket {
        if spins < SPINS_BEFORE_YIELD {
            spins += 1;
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
    }
    counter.store(ticket + 1, Ordering::Release);
}

impl<T: Copy> Ring<T> {
    /// Creates an empty ring of `2^capacity_log2` cells.
    #[must_use]
    pub fn new(capacity_log2: u32) -> Self {
        Self {
            head: Counter::default(),
            tail: Counter::default(),
            temp_head: Counter::default(),
            temp_tail: Counter::default(),
            slots: Slots::new(Geometry::new(capacity_log2)),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.geometry().capacity() as usize
    }

    /// Number of published, unclaimed items. Racy snapshot, only a hint.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.saturating_sub(head) as usize
    }

    /// Reserves a producer ticket, or `None` if every slot is in use.
    fn reserve_push(&self) -> Option<u64> {
        let capacity = self.slots.geometry().capacity();
        let mut temp_tail = self.temp_tail.load(Ordering::Relaxed);
        loop {
            // Acquire: pops of the slot we'd reuse have finished copying
            let temp_head = self.temp_head.load(Ordering::Acquire);
            if temp_head + capacity == temp_tail {
                return None;
            }
            debug_assert!(temp_head + capacity > temp_tail);

            match self.temp_tail.compare_exchange_weak(
                temp_tail,
                temp_tail + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(temp_tail),
                Err(current) => temp_tail = current,
            }
        }
    }

    /// Reserves a consumer ticket, or `None` if no item is published.
    fn reserve_pop(&self) -> Option<u64> {
        // Head before tail, or head could pass the tail we compare against
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // Acquire: the producer's slot write is visible
            let tail = self.tail.load(Ordering::Acquire);
            if head == tail {
                return None;
            }
            debug_assert!(tail > head);

            match self.head.compare_exchange_weak(
                head,
                head + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(head),
                Err(current) => head = current,
            }
        }
    }

    /// Attempts to push an item. Lock-free; safe for concurrent producers.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let Some(ticket) = self.reserve_push() else {
            return Err(item);
        };

        // SAFETY: the ticket gives this producer exclusive use of the slot until
        // it is published through `tail`.
        unsafe { self.slots.write(ticket, item) };

        publish_in_order(&self.tail, ticket);
        Ok(())
    }

    /// Attempts to pop an item. Lock-free; safe for concurrent consumers.
    pub fn try_pop(&self) -> Option<T> {
        let ticket = self.reserve_pop()?;

        // SAFETY: the slot was published (ticket < tail) and producers can't
        // reuse it until `temp_head` moves past the ticket.
        let item = unsafe { self.slots.read(ticket) };

        publish_in_order(&self.temp_head, ticket);
        Some(item)
    }
}

// SAFETY: Ring is Send because all fields are Send.
unsafe impl<T: Send> Send for Ring<T> {}

// SAFETY: every slot access is covered by a ticket obtained through CAS, and
// slot contents are handed over with Release/Acquire on tail and temp_head.
unsafe impl<T: Send> Sync for Ring<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters_partition_ring() {
        let ring = Ring::<u32>::new(2);
        assert!(ring.try_push(1).is_ok());
        assert!(ring.try_push(2).is_ok());
        assert_eq!(ring.try_pop(), Some(1));

        let load = |c: &Counter| c.load(Ordering::Relaxed);
        assert_eq!(load(&ring.temp_head), 1);
        assert_eq!(load(&ring.head), 1);
        assert_eq!(load(&ring.tail), 2);
        assert_eq!(load(&ring.temp_tail), 2);
    }

    #[test]
    fn test_full_and_empty() {
        let ring = Ring::<u32>::new(1);
        assert_eq!(ring.try_pop(), None);
        assert!(ring.try_push(1).is_ok());
        assert!(ring.try_push(2).is_ok());
        assert_eq!(ring.try_push(3), Err(3));
        assert_eq!(ring.try_pop(), Some(1));
        assert!(ring.try_push(3).is_ok());
        assert_eq!(ring.try_pop(), Some(2));
        assert_eq!(ring.try_pop(), Some(3));
        assert_eq!(ring.try_pop(), None);
    }

    #[test]
    fn test_multiple_producers() {
        let ring = Arc::new(Ring::<u64>::new(6));
        let num_producers = 4;
        let items_per_producer = 1000;

        let handles: Vec<_> = (0..num_producers)
            .map(|p| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for i in 0..items_per_producer {
                        let value = (p * 100_000 + i) as u64;
                        while ring.try_push(value).is_err() {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut items = Vec::new();
        while items.len() < num_producers * items_per_producer {
            match ring.try_pop() {
                Some(item) => items.push(item),
                None => thread::yield_now(),
            }
        }
        for h in handles {
            h.join().unwrap();
        }

        // Per-producer order survives the shared ring
        for p in 0..num_producers {
            let own: Vec<u64> = items
                .iter()
                .copied()
                .filter(|v| *v / 100_000 == p as u64)
                .collect();
            assert_eq!(own.len(), items_per_producer);
            assert!(own.windows(2).all(|w| w[0] < w[1]));
        }
        assert_eq!(ring.try_pop(), None);
    }
}
