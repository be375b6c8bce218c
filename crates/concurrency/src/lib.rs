//! Concurrency primitives for Storeline
//!
//! This crate implements the coordination building blocks:
//! - AtomicCell: mutual-exclusion wrapper with read/write/mutate
//! - SessionRegistry: arena of non-owning session handles with
//!   lazy liveness-checked pruning
//! - Foreground: explicit token for the coordinating (UI-affinity)
//!   thread, with a default dedicated-thread implementation
//! - WriteQueue: the single serialized execution context through which
//!   every committing write passes
//!
//! Everything here uses `parking_lot` locks: they do not poison, so one
//! panicking job cannot cascade failures into unrelated callers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic_cell;
pub mod foreground;
pub mod registry;
pub mod write_queue;

pub use atomic_cell::AtomicCell;
pub use foreground::{Foreground, ForegroundThread};
pub use registry::SessionRegistry;
pub use write_queue::WriteQueue;
