//! Data-model schema
//!
//! A `Schema` is the merged set of entity declarations the store is opened
//! with. Each declaration maps an entity kind to the configuration name of
//! the segment that holds records of that kind. Multiple schema sources
//! (the default model plus an optional custom one) merge into a single
//! schema before the store opens; on a kind collision the later source wins.

use crate::descriptor::DEFAULT_CONFIGURATION;
use crate::types::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One entity declaration: a kind and the configuration holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity kind being declared
    pub kind: EntityKind,
    /// Configuration name of the segment storing this kind
    pub configuration: String,
}

impl EntityDef {
    /// Declare `kind` as stored under `configuration`
    pub fn new(kind: impl Into<EntityKind>, configuration: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            configuration: configuration.into(),
        }
    }

    /// Declare `kind` under the default configuration
    pub fn default_configuration(kind: impl Into<EntityKind>) -> Self {
        Self::new(kind, DEFAULT_CONFIGURATION)
    }
}

/// Merged data-model schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Entity declarations, in declaration order
    pub entities: Vec<EntityDef>,
}

impl Schema {
    /// Build a schema from entity declarations
    pub fn new(entities: Vec<EntityDef>) -> Self {
        Self { entities }
    }

    /// Merge another schema into this one, returning the union
    ///
    /// On a kind declared by both, the `other` schema's declaration wins.
    pub fn merge(&self, other: &Schema) -> Schema {
        let mut merged = self.clone();
        for def in &other.entities {
            if let Some(existing) = merged.entities.iter_mut().find(|e| e.kind == def.kind) {
                *existing = def.clone();
            } else {
                merged.entities.push(def.clone());
            }
        }
        merged
    }

    /// Configuration names declared by this schema, deduplicated
    pub fn configurations(&self) -> BTreeSet<String> {
        self.entities
            .iter()
            .map(|e| e.configuration.clone())
            .collect()
    }

    /// Configuration holding records of `kind`, if declared
    pub fn configuration_of(&self, kind: &EntityKind) -> Option<&str> {
        self.entities
            .iter()
            .find(|e| &e.kind == kind)
            .map(|e| e.configuration.as_str())
    }

    /// True if no entities are declared
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
