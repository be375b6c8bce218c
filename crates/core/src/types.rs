//! Foundational identifier and record types
//!
//! - RecordId: durable identifier for one stored record
//! - SessionId: identity of one session object (not persisted)
//! - EntityKind: type-identity tag for records
//! - Record: an opaque record; the coordination layer never looks past
//!   the identifier and the kind tag

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Durable identifier for a stored record
///
/// A RecordId is a wrapper around a UUID v4. It survives commits and is the
/// identity carried by change notifications between sessions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new random RecordId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a RecordId from its string representation
    ///
    /// Accepts standard UUID format. Returns None if the string is not a
    /// valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one session object
///
/// SessionIds identify session *objects*, not their contents: two sessions
/// over the same data are still distinct. Change propagation uses this
/// identity to exclude exactly the session whose commit originated a save
/// from its own notification loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new unique SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-identity tag for records
///
/// The schema maps each kind to the store configuration whose segment holds
/// records of that kind.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityKind(String);

impl EntityKind {
    /// Create an EntityKind from a name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The kind name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored record: durable identifier, kind tag, opaque payload
///
/// The payload is an arbitrary JSON value. Nothing in the coordination layer
/// reads it; it flows through commits and merges untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Durable identifier
    pub id: RecordId,
    /// Type-identity tag
    pub kind: EntityKind,
    /// Opaque payload
    pub payload: serde_json::Value,
}

impl Record {
    /// Create a record with a fresh identifier
    pub fn new(kind: impl Into<EntityKind>, payload: serde_json::Value) -> Self {
        Self {
            id: RecordId::new(),
            kind: kind.into(),
            payload,
        }
    }

    /// Create a record with a caller-supplied identifier
    pub fn with_id(id: RecordId, kind: impl Into<EntityKind>, payload: serde_json::Value) -> Self {
        Self {
            id,
            kind: kind.into(),
            payload,
        }
    }
}
