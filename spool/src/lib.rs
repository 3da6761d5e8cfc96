//! Lock-free bounded queues, semaphores, and an asynchronous per-thread logger.
//!
//! - [`sync::spsc`], [`sync::spmc`], [`sync::mpmc`]: fixed-capacity queues of
//!   `Copy` items over a power-of-two ring.
//! - [`sync::semaphore::Semaphore`] and [`sync::os_semaphore::RawSemaphore`].
//! - [`log`]: thread-local byte buffers drained to a file by a background
//!   thread.

pub mod log;
pub mod ring;
pub mod sync;

mod mpmc;
mod spmc;
mod spsc;
mod trace;

pub use trace::init_tracing;
