//! Core SPSC (Single-Producer Single-Consumer) queue primitives.
//!
//! This module contains the shared ring buffer algorithm used by both:
//! - [`crate::sync::spsc`] - In-process queues split into producer/consumer handles
//! - [`crate::log`] - Per-thread byte buffers drained by the flush thread

pub(crate) mod ring;
