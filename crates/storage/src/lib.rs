//! Storage layer for Storeline
//!
//! This crate implements the backing persistent object store the
//! coordination layer sits in front of:
//! - Segment: one attached physical store segment (file-backed)
//! - StoreHandle: the store — schema, attached segments, commit sequence,
//!   save-event fan-out to listeners
//! - Session: isolated, single-execution-context views over the store's
//!   data, with snapshot isolation, pending-change overlays, commit
//!   cascades, and merge policies
//!
//! The coordination layer consumes this crate strictly through the
//! open/attach/session/commit/notify surface; everything else here is an
//! implementation detail of the reference engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod segment;
pub mod session;
pub mod store;

pub use segment::Segment;
pub use session::{ChangeSet, MergePolicy, Pending, Session, SessionTx};
pub use store::{SessionSaved, StoreHandle};
