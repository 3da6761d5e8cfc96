//! Core MPMC (Multi-Producer Multi-Consumer) queue primitives.
//!
//! This module contains a bounded lock-free ring where slot reservation and
//! slot publication are tracked by separate counters.
//!
//! Used by:
//! - [`crate::sync::mpmc`] - In-process queue shared between any number of threads

pub(crate) mod ring;
