//! Shared bounded-ring geometry used by every queue variant.
//!
//! All queues in this crate store their cells in a power-of-two circular array
//! addressed by monotonically increasing `u64` counters. Only the masked index
//! wraps; the counters themselves never do in practice (2^64 operations).
//!
//! ```text
//!   logical index:  0 1 2 3 4 5 6 7 8 9 ...
//!   slot (mask=3):  0 1 2 3 0 1 2 3 0 1 ...
//! ```

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::sync::atomic::AtomicU64;

/// Largest supported `capacity_log2`.
pub const MAX_CAPACITY_LOG2: u32 = 32;

/// Power-of-two ring geometry. Fixed for the lifetime of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    capacity_log2: u32,
}

impl Geometry {
    /// Creates the geometry for a ring of `2^capacity_log2` cells.
    ///
    /// # Panics
    ///
    /// Panics if `capacity_log2 > MAX_CAPACITY_LOG2`.
    #[must_use]
    pub const fn new(capacity_log2: u32) -> Self {
        assert!(
            capacity_log2 <= MAX_CAPACITY_LOG2,
            "ring capacity_log2 out of range"
        );
        Self { capacity_log2 }
    }

    #[inline]
    #[must_use]
    pub const fn capacity_log2(self) -> u32 {
        self.capacity_log2
    }

    #[inline]
    #[must_use]
    pub const fn capacity(self) -> u64 {
        1u64 << self.capacity_log2
    }

    #[inline]
    #[must_use]
    pub const fn mask(self) -> u64 {
        self.capacity() - 1
    }

    /// Maps a logical counter value onto a slot index.
    #[inline]
    #[must_use]
    pub const fn slot(self, logical: u64) -> usize {
        (logical & self.mask()) as usize
    }
}

/// An atomic counter on its own cache line.
///
/// Head and tail are written by different threads; keeping them apart avoids
/// false sharing between the two sides of a queue.
#[repr(C)]
#[repr(align(64))]
#[derive(Default)]
pub struct CachePadded<T>(T);

impl<T> CachePadded<T> {
    pub const fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

/// Padded `u64` counter, the building block of every queue index.
pub type Counter = CachePadded<AtomicU64>;

/// Contiguous cell storage for a ring.
///
/// The storage never inspects its cells. Which thread may touch which slot is
/// decided entirely by the owning queue's counter protocol, so every accessor
/// that reads or writes a slot is `unsafe`.
pub struct Slots<T> {
    cells: Box<[UnsafeCell<MaybeUninit<T>>]>,
    geometry: Geometry,
}

impl<T: Copy> Slots<T> {
    /// Allocates `2^geometry.capacity_log2()` uninitialized cells.
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        let cells = (0..geometry.capacity())
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self { cells, geometry }
    }

    #[inline]
    #[must_use]
    pub const fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Raw pointer to the first cell; valid for the whole ring.
    #[inline]
    fn base(&self) -> *mut T {
        UnsafeCell::raw_get(self.cells.as_ptr()).cast::<T>()
    }

    /// Writes `item` into the slot for `logical`.
    ///
    /// # Safety
    ///
    /// The caller must own that slot: no other thread may read or write it
    /// until the caller publishes it through the queue's counters.
    #[inline]
    pub unsafe fn write(&self, logical: u64, item: T) {
        let slot = self.geometry.slot(logical);
        // SAFETY: slot < capacity, and the caller owns the cell.
        unsafe { self.base().add(slot).write(item) }
    }

    /// Reads the slot for `logical`.
    ///
    /// # Safety
    ///
    /// The slot must hold a published item that no one is writing.
    #[inline]
    pub unsafe fn read(&self, logical: u64) -> T {
        let slot = self.geometry.slot(logical);
        // SAFETY: slot < capacity; the caller guarantees the cell is initialized.
        unsafe { self.base().add(slot).read() }
    }

    /// Copies the slot for `logical` without assuming it holds a valid item.
    ///
    /// Used by consumers that race on the same slot and validate their claim
    /// afterwards with a CAS. The copy may be torn if another thread is writing
    /// the cell; the caller discards it in that case and never assumes it
    /// initialized.
    ///
    /// This is the seqlock read pattern: the volatile read can overlap the
    /// producer's plain write, which Rust's memory model counts as a data race
    /// whatever the destination type. `MaybeUninit` only keeps a torn value
    /// from being treated as a `T`; it does not make the overlap defined. The
    /// race is accepted here, as in other seqlock-style readers, because the
    /// racing copy is never used.
    ///
    /// # Safety
    ///
    /// The caller must call `assume_init` on the result only after proving
    /// that no write to the slot overlapped the copy (the SPMC head CAS), and
    /// must otherwise drop it unread.
    #[inline]
    pub unsafe fn read_speculative(&self, logical: u64) -> MaybeUninit<T> {
        let slot = self.geometry.slot(logical);
        // SAFETY: slot < capacity; the caller upholds the claim-before-use rule.
        unsafe {
            self.base()
                .add(slot)
                .cast::<MaybeUninit<T>>()
                .read_volatile()
        }
    }

    /// Copies `src` into consecutive slots starting at `logical`, wrapping once.
    ///
    /// # Safety
    ///
    /// The caller must own all `src.len()` slots and `src.len() <= capacity`.
    pub unsafe fn write_run(&self, logical: u64, src: &[T]) {
        let start = self.geometry.slot(logical);
        let first = src.len().min(self.cells.len() - start);
        // SAFETY: both runs stay inside the ring; the caller owns the cells and
        // `src` cannot alias ring storage it has no reference to.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.base().add(start), first);
            std::ptr::copy_nonoverlapping(src.as_ptr().add(first), self.base(), src.len() - first);
        }
    }

    /// Copies consecutive slots starting at `logical` into `dst`, wrapping once.
    ///
    /// # Safety
    ///
    /// All `dst.len()` slots must hold published items nobody is writing, and
    /// `dst.len() <= capacity`.
    pub unsafe fn read_run(&self, logical: u64, dst: &mut [T]) {
        let start = self.geometry.slot(logical);
        let first = dst.len().min(self.cells.len() - start);
        // SAFETY: see `write_run`.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(start), dst.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(self.base(), dst.as_mut_ptr().add(first), dst.len() - first);
        }
    }

    /// Borrows the (at most two) contiguous runs covering `[head, tail)`.
    ///
    /// The first run starts at `head`'s slot and stops at `tail`'s slot or the
    /// end of the array, whichever comes first. The second run is the wrapped
    /// remainder starting at slot 0 and is empty unless the data wraps.
    ///
    /// # Safety
    ///
    /// Every slot in `[head, tail)` must hold a published item that nobody
    /// writes while the returned slices are alive, and `tail - head <= capacity`.
    pub unsafe fn runs(&self, head: u64, tail: u64) -> (&[T], &[T]) {
        let used = (tail - head) as usize;
        if used == 0 {
            return (&[], &[]);
        }
        let start = self.geometry.slot(head);
        let first = used.min(self.cells.len() - start);
        // SAFETY: the caller guarantees the cells are initialized and stable.
        unsafe {
            (
                std::slice::from_raw_parts(self.base().add(start), first),
                std::slice::from_raw_parts(self.base(), used - first),
            )
        }
    }
}

// SAFETY: the cells are plain `Copy` data; cross-thread access is mediated by
// the owning queue's atomic counters.
unsafe impl<T: Send> Send for Slots<T> {}
unsafe impl<T: Send> Sync for Slots<T> {}
