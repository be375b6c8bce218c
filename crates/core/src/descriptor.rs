//! Store segment descriptions
//!
//! A `StoreDescription` configures one physical store segment: where it
//! lives, whether it may be written, and what to do when attaching it
//! fails. One store may be backed by several segments; each configuration
//! name declared by the schema maps 1:1 to a description.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Configuration name used when no explicit configuration is declared.
pub const DEFAULT_CONFIGURATION: &str = "default";

/// Configuration for one physical store segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDescription {
    /// Configuration name this segment serves
    pub configuration: String,
    /// Segment file location
    pub path: PathBuf,
    /// Attach the segment read-only; commits routed to it are rejected
    #[serde(default)]
    pub read_only: bool,
    /// On attach failure, delete the segment files and retry once
    #[serde(default)]
    pub delete_on_error: bool,
    /// Engine-specific options, passed through opaquely
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl StoreDescription {
    /// Description for a writable segment under `configuration`
    pub fn new(configuration: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            configuration: configuration.into(),
            path: path.into(),
            read_only: false,
            delete_on_error: false,
            options: BTreeMap::new(),
        }
    }

    /// The conventional user-data segment: writable, delete-on-error,
    /// default configuration, stored as `user.storeline` under `root`.
    pub fn user_data_store(root: impl AsRef<Path>) -> Self {
        let mut desc = Self::new(
            DEFAULT_CONFIGURATION,
            root.as_ref().join("user.storeline"),
        );
        desc.delete_on_error = true;
        desc
    }

    /// Mark the segment read-only
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Request delete-and-retry on attach failure
    pub fn delete_on_error(mut self) -> Self {
        self.delete_on_error = true;
        self
    }

    /// Remove the segment's files from disk
    ///
    /// Used by the delete-on-error attach policy. A missing file is not an
    /// error; anything else is surfaced to the caller.
    pub fn remove_store_files(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
