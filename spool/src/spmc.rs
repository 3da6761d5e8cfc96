//! Core SPMC (Single-Producer Multi-Consumer) queue primitives.
//!
//! One producer publishes with a plain atomic increment; consumers race for
//! each item with a CAS on the shared head.
//!
//! Used by:
//! - [`crate::sync::spmc`] - In-process queues with a cloneable consumer handle

pub(crate) mod ring;
