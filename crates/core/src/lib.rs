//! Core types for Storeline
//!
//! This crate defines the foundational types shared by every layer:
//! - Error / Result: the error taxonomy for the whole system
//! - RecordId / EntityKind / Record: opaque records with durable identifiers
//! - ChangeNotification: immutable description of one commit's effects
//! - StoreDescription: configuration for one physical store segment
//! - Schema: merged data-model declarations mapping entity kinds to
//!   store configurations
//!
//! The coordination layer never inspects record payloads beyond the durable
//! identifier and the entity-kind tag; payloads are opaque JSON values.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod notification;
pub mod schema;
pub mod types;

pub use descriptor::StoreDescription;
pub use error::{Error, Result};
pub use notification::ChangeNotification;
pub use schema::{EntityDef, Schema};
pub use types::{EntityKind, Record, RecordId, SessionId};
