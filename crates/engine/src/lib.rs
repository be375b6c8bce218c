//! Coordination engine for Storeline
//!
//! This crate orchestrates the layers underneath into one logical database
//! handle:
//! - Database: lazy one-time store initialization, the writer and view
//!   sessions, the serialized write lane, the public write/read surface
//! - MergePropagator: reacts to writer saves, refreshes the view on the
//!   coordinating thread, replays the change into every live registered
//!   session
//! - NotificationBridge: the narrow adapter onto the store's native
//!   save-event mechanism
//!
//! The engine is the only component that knows about cross-layer
//! coordination; callers see `Database` and sessions, nothing else.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod database;
pub mod propagator;

pub use bridge::NotificationBridge;
pub use database::{
    ChangeHook, CoordinatorMetrics, Database, DatabaseBuilder, Participation,
};
pub use propagator::MergePropagator;
