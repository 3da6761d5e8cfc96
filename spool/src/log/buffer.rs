//! Per-thread log buffers and the lock-free list that links them.
//!
//! Every thread that logs through a pipeline gets its own [`ThreadBuffer`]: a
//! byte ring written only by that thread and drained only by the flush thread,
//! plus a semaphore counting the ring's free bytes. Buffers are created on the
//! thread's first write and prepended to the pipeline's [`Registry`] with a
//! CAS. Nothing is ever unlinked; the whole list is freed with the registry.
//!
//! ```text
//! head ──> [thread C] ──> [thread B] ──> [thread A] ──> null
//!             ^ newest registration goes in front
//! ```

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::spsc::ring::Ring;
use crate::sync::Timeout;
use crate::sync::semaphore::Semaphore;
use crate::trace::debug;

use super::fatal;

/// Source of registry ids. Ids are never reused within a process.
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Ids of registries that haven't been dropped yet. Only touched when a
/// registry is created or dropped and when a thread registers a buffer.
static LIVE_REGISTRIES: Mutex<BTreeSet<u64>> = Mutex::new(BTreeSet::new());

fn live_registries() -> std::sync::MutexGuard<'static, BTreeSet<u64>> {
    LIVE_REGISTRIES.lock().unwrap_or_else(PoisonError::into_inner)
}

thread_local! {
    /// This thread's buffers, one per registry it has written to.
    static LOCAL_BUFFERS: RefCell<Vec<(u64, NonNull<ThreadBuffer>)>> =
        const { RefCell::new(Vec::new()) };
}

/// One thread's pending log bytes.
pub(crate) struct ThreadBuffer {
    /// Older registration. Written once before the node is published.
    next: AtomicPtr<ThreadBuffer>,
    /// Free bytes in `queue`. The owner takes, the flush thread gives back.
    free: Semaphore,
    /// Producer: the owning thread. Consumer: the flush thread.
    queue: Ring<u8>,
}

impl ThreadBuffer {
    fn new(capacity_log2: u32) -> Self {
        let queue = Ring::new(capacity_log2);
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            free: Semaphore::new(queue.capacity()),
            queue,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Free bytes right now. Racy, only good for deciding to wake the flusher.
    pub(crate) fn free_space(&self) -> usize {
        self.capacity() - self.queue.len()
    }

    /// Bytes waiting to be flushed. Racy snapshot.
    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Blocks until `bytes` fit, then appends them.
    ///
    /// # Safety
    ///
    /// Only the thread that registered this buffer may call this.
    pub(crate) unsafe fn append(&self, bytes: &[u8]) {
        self.free.wait(bytes.len(), Timeout::Infinite);
        // SAFETY: the caller is the buffer's only producer.
        if !unsafe { self.queue.multi_push(bytes) } {
            // The semaphore never grants more than the ring has free
            fatal(format_args!(
                "log buffer rejected {} bytes after reserving them",
                bytes.len()
            ));
        }
    }

    /// Writes every queued byte to `out` in order, then releases the space.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Safety
    ///
    /// Only the flush thread may call this.
    pub(crate) unsafe fn drain(&self, out: &mut dyn Write) -> io::Result<usize> {
        // SAFETY: the flush thread is the only consumer, and nothing pops while
        // the two runs are borrowed.
        let (first, second) = unsafe { self.queue.peek() };
        let written = first.len() + second.len();
        if written == 0 {
            return Ok(0);
        }
        out.write_all(first)?;
        out.write_all(second)?;

        // SAFETY: same consumer; the runs are no longer used.
        let released = unsafe { self.queue.skip(written) };
        debug_assert!(released);
        self.free.signal(written);
        Ok(written)
    }
}

/// Prepend-only list of every thread buffer belonging to one pipeline.
pub(crate) struct Registry {
    id: u64,
    capacity_log2: u32,
    head: AtomicPtr<ThreadBuffer>,
    len: AtomicUsize,
}

impl Registry {
    pub(crate) fn new(capacity_log2: u32) -> Self {
        let id = NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed);
        live_registries().insert(id);
        Self {
            id,
            capacity_log2,
            head: AtomicPtr::new(ptr::null_mut()),
            len: AtomicUsize::new(0),
        }
    }

    /// Number of registered buffers.
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// The calling thread's buffer, registering one on first use.
    pub(crate) fn local(&self) -> &ThreadBuffer {
        let cached = LOCAL_BUFFERS.with_borrow(|buffers| {
            buffers
                .iter()
                .find(|(id, _)| *id == self.id)
                .map(|(_, buffer)| *buffer)
        });

        let buffer = match cached {
            Some(buffer) => buffer,
            None => {
                let buffer = self.register(Box::new(ThreadBuffer::new(self.capacity_log2)));
                LOCAL_BUFFERS.with_borrow_mut(|buffers| {
                    // Entries of dropped registries point at freed nodes
                    let live = live_registries();
                    buffers.retain(|(id, _)| live.contains(id));
                    buffers.push((self.id, buffer));
                });
                debug!(
                    thread = ?std::thread::current().name(),
                    registered = self.len(),
                    "registered log buffer"
                );
                buffer
            }
        };

        // SAFETY: linked nodes live as long as the registry, and the cache
        // entry matched this registry's id, which no other registry shares.
        unsafe { buffer.as_ref() }
    }

    /// Links `node` in at the head of the list.
    fn register(&self, node: Box<ThreadBuffer>) -> NonNull<ThreadBuffer> {
        let node = NonNull::from(Box::leak(node));
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: the node isn't published yet, so we are its only user.
            unsafe { node.as_ref() }.next.store(head, Ordering::Relaxed);
            // Release: a walker that sees the node also sees its `next`
            match self.head.compare_exchange_weak(
                head,
                node.as_ptr(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }
        self.len.fetch_add(1, Ordering::Relaxed);
        node
    }

    /// Walks the list from the newest registration to the oldest.
    ///
    /// Safe to run concurrently with `register`: a walk simply misses buffers
    /// linked after it started.
    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head.load(Ordering::Acquire),
            _registry: PhantomData,
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        live_registries().remove(&self.id);
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            // SAFETY: every node came from Box::leak in `register`, and with
            // `&mut self` no walker or writer can still reach it.
            let node = unsafe { Box::from_raw(current) };
            current = node.next.load(Ordering::Relaxed);
        }
    }
}

pub(crate) struct Iter<'a> {
    next: *const ThreadBuffer,
    _registry: PhantomData<&'a Registry>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a ThreadBuffer;

    fn next(&mut self) -> Option<&'a ThreadBuffer> {
        // SAFETY: nodes are neither unlinked nor freed while the registry lives.
        let node = unsafe { self.next.as_ref() }?;
        self.next = node.next.load(Ordering::Acquire);
        Some(node)
    }
}

#[cfg(test)]
fn local_entries() -> usize {
    LOCAL_BUFFERS.with_borrow(Vec::len)
}
