//! Core lock-free SPSC ring buffer algorithm.
//!
//! This module provides the ring used by both the public [`crate::sync::spsc`]
//! handles and the per-thread log buffers in [`crate::log`].
//!
//! # Safety
//!
//! The types in this module have unsafe APIs because they require the caller to
//! uphold the SPSC invariant: exactly one producer and one consumer, with no
//! concurrent access to either role.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ring::{Geometry, Slots};

/// Role marker: Fields with this role are owned exclusively by the producer.
pub struct ProducerRole;

/// Role marker: Fields with this role are owned exclusively by the consumer.
pub struct ConsumerRole;

/// Interior-mutable cell with a role marker for nominal type safety.
///
/// `SpscCell<T, Role>` wraps an `UnsafeCell<T>` with a phantom `Role` parameter.
/// The `Role` doesn't affect runtime behavior; it only makes the producer's and
/// the consumer's private caches distinct types.
#[repr(transparent)]
pub struct SpscCell<T, Role>(UnsafeCell<T>, PhantomData<Role>);

impl<T: Copy, Role> SpscCell<T, Role> {
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value), PhantomData)
    }

    /// # Safety
    ///
    /// Only the thread playing `Role` may call this.
    #[inline]
    unsafe fn load(&self) -> T {
        // SAFETY: the role owner has exclusive access.
        unsafe { *self.0.get() }
    }

    /// # Safety
    ///
    /// Only the thread playing `Role` may call this.
    #[inline]
    unsafe fn store(&self, value: T) {
        // SAFETY: the role owner has exclusive access.
        unsafe { *self.0.get() = value }
    }
}

// SAFETY: each SpscCell is only touched by the thread owning its role.
unsafe impl<T: Send, Role> Sync for SpscCell<T, Role> {}
unsafe impl<T: Send, Role> Send for SpscCell<T, Role> {}

/// Producer-side state: tail index and cached head.
#[repr(C)]
#[repr(align(64))]
pub struct ProducerState {
    /// Write index (next logical slot to fill).
    /// Owned by producer, read by consumer.
    pub tail: AtomicU64,

    /// Last value of the consumer's head seen by the producer.
    pub cached_head: SpscCell<u64, ProducerRole>,
}

/// Consumer-side state: head index and cached tail.
#[repr(C)]
#[repr(align(64))]
pub struct ConsumerState {
    /// Read index (next logical slot to drain).
    /// Owned by consumer, read by producer.
    pub head: AtomicU64,

    /// Last value of the producer's tail seen by the consumer.
    pub cached_tail: SpscCell<u64, ConsumerRole>,
}

/// Core SPSC ring. Invariant: `head <= tail <= head + capacity`.
pub struct Ring<T> {
    producer: ProducerState,
    consumer: ConsumerState,
    slots: Slots<T>,
}

impl<T: Copy> Ring<T> {
    /// Creates an empty ring of `2^capacity_log2` cells.
    #[must_use]
    pub fn new(capacity_log2: u32) -> Self {
        Self {
            producer: ProducerState {
                tail: AtomicU64::new(0),
                cached_head: SpscCell::new(0),
            },
            consumer: ConsumerState {
                head: AtomicU64::new(0),
                cached_tail: SpscCell::new(0),
            },
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
        let head = self.consumer.head.load(Ordering::Acquire);
        let tail = self.producer.tail.load(Ordering::Acquire);
        tail.saturating_sub(head) as usize
    }

    /// Returns the tail, provided `n` more items fit.
    ///
    /// # Safety
    ///
    /// Producer only.
    #[inline]
    unsafe fn reserve(&self, n: u64) -> Option<u64> {
        let capacity = self.slots.geometry().capacity();
        let tail = self.producer.tail.load(Ordering::Relaxed);

        // SAFETY: producer owns cached_head.
        let mut head = unsafe { self.producer.cached_head.load() };
        if tail - head + n > capacity {
            // Refresh from the real head (acquire: the consumer is done with those slots)
            head = self.consumer.head.load(Ordering::Acquire);
            // SAFETY: producer owns cached_head.
            unsafe { self.producer.cached_head.store(head) };
            if tail - head + n > capacity {
                return None;
            }
        }
        Some(tail)
    }

    /// Returns the head, provided at least `n` items are available.
    ///
    /// # Safety
    ///
    /// Consumer only.
    #[inline]
    unsafe fn available(&self, n: u64) -> Option<u64> {
        let head = self.consumer.head.load(Ordering::Relaxed);

        // SAFETY: consumer owns cached_tail.
        let mut tail = unsafe { self.consumer.cached_tail.load() };
        if tail - head < n {
            // Refresh from the real tail (acquire: the producer's writes are visible)
            tail = self.producer.tail.load(Ordering::Acquire);
            // SAFETY: consumer owns cached_tail.
            unsafe { self.consumer.cached_tail.store(tail) };
            if tail - head < n {
                return None;
            }
        }
        Some(head)
    }

    /// Attempts to push an item onto the ring.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer.
    #[inline]
    pub unsafe fn push(&self, item: T) -> Result<(), T> {
        // SAFETY: forwarded producer contract.
        let Some(tail) = (unsafe { self.reserve(1) }) else {
            return Err(item);
        };

        // SAFETY: the slot at `tail` is outside [head, tail), so the consumer
        // won't touch it until the store below publishes it.
        unsafe { self.slots.write(tail, item) };

        // Publish (release: the slot write happens-before the consumer's acquire)
        self.producer.tail.store(tail + 1, Ordering::Release);
        Ok(())
    }

    /// Pushes all of `items` or none of them.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer.
    pub unsafe fn multi_push(&self, items: &[T]) -> bool {
        if items.is_empty() {
            return true;
        }
        // SAFETY: forwarded producer contract.
        let Some(tail) = (unsafe { self.reserve(items.len() as u64) }) else {
            return false;
        };

        // SAFETY: all reserved slots are free and unpublished.
        unsafe { self.slots.write_run(tail, items) };

        self.producer
            .tail
            .store(tail + items.len() as u64, Ordering::Release);
        true
    }

    /// Attempts to pop an item from the ring.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    #[inline]
    pub unsafe fn pop(&self) -> Option<T> {
        // SAFETY: forwarded consumer contract.
        let head = unsafe { self.available(1) }?;

        // SAFETY: the slot was published by the producer and won't be reused
        // until the head store below.
        let item = unsafe { self.slots.read(head) };

        // Release the slot (release: our read happens-before the producer reuses it)
        self.consumer.head.store(head + 1, Ordering::Release);
        Some(item)
    }

    /// Fills `out` from the ring, or pops nothing if fewer items are queued.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    pub unsafe fn multi_pop(&self, out: &mut [T]) -> bool {
        if out.is_empty() {
            return true;
        }
        // SAFETY: forwarded consumer contract.
        let Some(head) = (unsafe { self.available(out.len() as u64) }) else {
            return false;
        };

        // SAFETY: all slots in the run are published.
        unsafe { self.slots.read_run(head, out) };

        self.consumer
            .head
            .store(head + out.len() as u64, Ordering::Release);
        true
    }

    /// Discards `n` items without copying them out.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    pub unsafe fn skip(&self, n: usize) -> bool {
        if n == 0 {
            return true;
        }
        // SAFETY: forwarded consumer contract.
        let Some(head) = (unsafe { self.available(n as u64) }) else {
            return false;
        };
        self.consumer.head.store(head + n as u64, Ordering::Release);
        true
    }

    /// Borrows the queued items as (at most) two contiguous runs.
    ///
    /// Both runs come from a single snapshot of the tail, so together they are
    /// exactly the items queued at that instant, oldest first.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer, and must not pop, `multi_pop` or
    /// `skip` while the returned slices are alive.
    pub unsafe fn peek(&self) -> (&[T], &[T]) {
        let head = self.consumer.head.load(Ordering::Relaxed);
        let tail = self.producer.tail.load(Ordering::Acquire);
        // SAFETY: consumer owns cached_tail.
        unsafe { self.consumer.cached_tail.store(tail) };

        // SAFETY: [head, tail) is published, and the producer can't reuse those
        // slots before the consumer advances head.
        unsafe { self.slots.runs(head, tail) }
    }
}

// SAFETY: Ring is Send because all fields are Send.
unsafe impl<T: Send> Send for Ring<T> {}

// SAFETY: Ring is Sync because concurrent access is mediated by atomics:
// - head/tail are AtomicU64 with Release/Acquire ordering
// - Buffer slots are protected by the SPSC invariant (see SpscCell)
unsafe impl<T: Send> Sync for Ring<T> {}
