//! Change notifications
//!
//! A `ChangeNotification` is the immutable description of one commit:
//! which entity kinds were touched, and the durable identifiers of the
//! records inserted, updated, and deleted. It is produced exactly once per
//! successful store-level commit and shared by `Arc` with every consumer
//! (view refresh, registered-session replay, the external commit hook).

use crate::types::{EntityKind, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Immutable description of one commit's effects
///
/// All sets may be empty; a commit that carries no identifier set of a given
/// class simply yields an empty set for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Entity kinds affected by this commit
    pub kinds: BTreeSet<EntityKind>,
    /// Records inserted by this commit
    pub inserted: BTreeSet<RecordId>,
    /// Records updated by this commit
    pub updated: BTreeSet<RecordId>,
    /// Records deleted by this commit
    pub deleted: BTreeSet<RecordId>,
}

impl ChangeNotification {
    /// Create a notification from its component sets
    pub fn new(
        kinds: BTreeSet<EntityKind>,
        inserted: BTreeSet<RecordId>,
        updated: BTreeSet<RecordId>,
        deleted: BTreeSet<RecordId>,
    ) -> Self {
        Self {
            kinds,
            inserted,
            updated,
            deleted,
        }
    }

    /// A notification describing no changes
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if the commit touched nothing
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Identifiers whose authoritative state must be re-read after this
    /// commit (inserted and updated records; deleted ones no longer exist).
    pub fn refreshed_ids(&self) -> impl Iterator<Item = &RecordId> {
        self.inserted.iter().chain(self.updated.iter())
    }

    /// Total number of identifiers carried
    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}
