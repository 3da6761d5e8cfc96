//! Lock-free SPSC queue for in-process (inter-thread) communication.
//!
//! A wait-free bounded queue using a heap-allocated ring buffer with atomic indices.
//!
//! # Overview
//!
//! - [`Producer`] - Write end (single producer per queue)
//! - [`Consumer`] - Read end (single consumer per queue)
//! - Lock-free, wait-free: no mutexes or syscalls in the hot path
//! - Batched all-or-nothing transfers ([`Producer::multi_push`],
//!   [`Consumer::multi_pop`]) and zero-copy reads ([`Consumer::peek`])
//!
//! # Example
//!
//! ```
//! use spool::sync::spsc;
//!
//! let (producer, mut consumer) = spsc::channel::<u8>(2);
//!
//! assert!(producer.multi_push(&[1, 2, 3]));
//! assert_eq!(consumer.peek(), (&[1u8, 2, 3][..], &[][..]));
//! assert!(consumer.skip(2));
//! assert_eq!(consumer.pop(), Some(3));
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::spsc::ring::Ring;
use crate::sync::{Timeout, expired};

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of the SPSC queue.
///
/// # Thread Safety
///
/// `Producer` is [`Send`] but **not** [`Sync`]:
/// - Can transfer ownership to another thread
/// - Cannot share `&Producer` (no concurrent `push()`)
pub struct Producer<T: Copy + Send> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomUnsync,
}

/// Read end of the SPSC queue.
///
/// See [`Producer`] for thread safety details (same semantics apply).
pub struct Consumer<T: Copy + Send> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomUnsync,
}

/// Creates a new SPSC channel holding `2^capacity_log2` items.
///
/// # Panics
///
/// Panics if `capacity_log2` exceeds [`crate::ring::MAX_CAPACITY_LOG2`].
#[must_use]
pub fn channel<T: Copy + Send>(capacity_log2: u32) -> (Producer<T>, Consumer<T>) {
    let ring = Arc::new(Ring::new(capacity_log2));

    let producer = Producer {
        ring: Arc::clone(&ring),
        _unsync: PhantomData,
    };

    let consumer = Consumer {
        ring,
        _unsync: PhantomData,
    };

    (producer, consumer)
}

impl<T: Copy + Send> Producer<T> {
    /// Attempts to push an item onto the queue (wait-free).
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full, allowing retry.
    #[inline]
    pub fn push(&self, item: T) -> Result<(), T> {
        // SAFETY: Producer is the unique, !Sync owner of the producer side.
        unsafe { self.ring.push(item) }
    }

    /// Pushes every item in `items`, or nothing if they don't all fit.
    #[inline]
    #[must_use]
    pub fn multi_push(&self, items: &[T]) -> bool {
        // SAFETY: see `push`.
        unsafe { self.ring.multi_push(items) }
    }

    /// Spins until space is available, then pushes.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` on timeout.
    #[inline]
    pub fn push_blocking(&self, mut item: T, timeout: Timeout) -> Result<(), T> {
        let deadline = timeout.deadline();
        loop {
            match self.push(item) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    item = returned;
                    if expired(deadline) {
                        return Err(item);
                    }
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Items currently queued. A hint: the consumer may drain concurrently.
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

    /// Free slots. A lower bound from the producer's point of view.
    #[inline]
    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<T: Copy + Send> Consumer<T> {
    /// Attempts to pop an item from the queue (wait-free).
    ///
    /// Returns `None` if the queue is empty.
    #[inline]
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        // SAFETY: Consumer is the unique, !Sync owner of the consumer side.
        unsafe { self.ring.pop() }
    }

    /// Fills `out` completely, or pops nothing if fewer items are queued.
    #[inline]
    #[must_use]
    pub fn multi_pop(&self, out: &mut [T]) -> bool {
        // SAFETY: see `pop`.
        unsafe { self.ring.multi_pop(out) }
    }

    /// Drops the `n` oldest items without copying them, or nothing if fewer
    /// are queued. Pairs with [`Consumer::peek`].
    #[inline]
    #[must_use]
    pub fn skip(&self, n: usize) -> bool {
        // SAFETY: see `pop`.
        unsafe { self.ring.skip(n) }
    }

    /// Borrows the queued items in place as two contiguous runs.
    ///
    /// The first run starts at the oldest item and ends at the newest item or
    /// the end of the ring storage; the second run holds the wrapped remainder
    /// and is empty unless the data wraps. Nothing is released: call
    /// [`Consumer::skip`] with the number of items actually consumed.
    #[inline]
    #[must_use]
    pub fn peek(&mut self) -> (&[T], &[T]) {
        // SAFETY: `&mut self` keeps pop/skip from running while the slices live.
        unsafe { self.ring.peek() }
    }

    /// Spins until an item is available, then pops.
    ///
    /// Returns `None` on timeout.
    #[inline]
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

    /// Items currently queued. A hint: the producer may push concurrently.
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
    fn test_basic_push_pop() {
        let (producer, consumer) = channel::<u64>(3);

        assert!(producer.push(42).is_ok());
        assert_eq!(consumer.pop(), Some(42));
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    fn test_capacity_four_byte_scenario() {
        let (producer, consumer) = channel::<u8>(2);
        assert_eq!(producer.capacity(), 4);

        for b in [1, 2, 3, 4] {
            assert!(producer.push(b).is_ok());
        }
        assert_eq!(producer.push(5), Err(5));

        assert_eq!(consumer.pop(), Some(1));
        assert_eq!(consumer.pop(), Some(2));

        assert!(producer.push(5).is_ok());
        assert!(producer.push(6).is_ok());

        let mut rest = [0u8; 4];
        assert!(consumer.multi_pop(&mut rest));
        assert_eq!(rest, [3, 4, 5, 6]);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_wrapping_behavior() {
        let (producer, consumer) = channel::<u64>(2);

        for round in 0..5 {
            for i in 0..4 {
                assert!(producer.push(round * 10 + i).is_ok());
            }
            for i in 0..4 {
                assert_eq!(consumer.pop(), Some(round * 10 + i));
            }
            assert_eq!(consumer.pop(), None);
        }
    }

    #[test]
    fn test_multi_push_fills_exactly_to_capacity() {
        let (producer, consumer) = channel::<u8>(3);
        assert!(producer.multi_push(&[0; 8]));
        assert_eq!(producer.free(), 0);
        assert!(!producer.multi_push(&[1]));
        assert!(consumer.skip(8));
        assert_eq!(producer.free(), 8);
    }

    #[test]
    fn test_peek_then_skip() {
        let (producer, mut consumer) = channel::<u8>(2);
        assert!(producer.multi_push(&[1, 2, 3]));
        assert!(consumer.skip(3));
        assert!(producer.multi_push(&[4, 5, 6]));

        let (first, second) = consumer.peek();
        assert_eq!(first, &[4]);
        assert_eq!(second, &[5, 6]);
        let consumed = first.len() + second.len();

        assert!(consumer.skip(consumed));
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_blocking_ops_time_out() {
        let (producer, consumer) = channel::<u32>(0);
        assert_eq!(
            consumer.pop_blocking(Timeout::Duration(Duration::from_millis(5))),
            None
        );
        producer.push(1).unwrap();
        assert_eq!(
            producer.push_blocking(2, Duration::from_millis(5).into()),
            Err(2)
        );
        assert_eq!(consumer.pop_blocking(Timeout::Infinite), Some(1));
    }

    #[test]
    fn test_concurrent_push_pop() {
        let (producer, consumer) = channel::<u64>(6);
        let count = 100_000u64;

        let producer_handle = std::thread::spawn(move || {
            for i in 0..count {
                while producer.push(i).is_err() {
                    std::hint::spin_loop();
                }
            }
        });

        let consumer_handle = std::thread::spawn(move || {
            let mut received = Vec::with_capacity(count as usize);
            while received.len() < count as usize {
                if let Some(item) = consumer.pop() {
                    received.push(item);
                } else {
                    std::hint::spin_loop();
                }
            }
            received
        });

        producer_handle.join().unwrap();
        let received = consumer_handle.join().unwrap();

        // Verify FIFO order
        for (i, &val) in received.iter().enumerate() {
            assert_eq!(val, i as u64);
        }
    }

    #[test]
    fn test_concurrent_random_batches() {
        let (producer, consumer) = channel::<u8>(10);
        let total = 1 << 20;
        let input: Vec<u8> = (0..total).map(|i| (i * 31 % 251) as u8).collect();
        let expected = input.clone();

        let writer = std::thread::spawn(move || {
            let mut sent = 0;
            let mut step = 1;
            while sent < input.len() {
                let n = step.min(input.len() - sent);
                while !producer.multi_push(&input[sent..sent + n]) {
                    std::hint::spin_loop();
                }
                sent += n;
                step = (step * 7 + 3) % producer.capacity() + 1;
            }
        });

        let mut output = Vec::with_capacity(total);
        let mut scratch = vec![0u8; consumer.capacity()];
        while output.len() < total {
            let n = consumer.len();
            if n == 0 {
                std::hint::spin_loop();
                continue;
            }
            assert!(consumer.multi_pop(&mut scratch[..n]));
            output.extend_from_slice(&scratch[..n]);
        }
        writer.join().unwrap();

        assert_eq!(output, expected);
    }
}
