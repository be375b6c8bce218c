//! Error types for Storeline
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Storage failures are observability events at the coordination boundary:
//! they are logged at the point of the storage call and converted to
//! absent/empty results rather than propagated to callers of the public
//! write/read closures. The variants below exist for the layers underneath
//! that boundary.

use std::io;
use thiserror::Error;

/// Result type alias for Storeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the coordination and storage layers
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (segment files, directory creation)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A segment file exists but could not be decoded
    #[error("Segment corruption: {0}")]
    Corruption(String),

    /// A physical segment could not be attached to the store
    #[error("Failed to attach segment for configuration '{configuration}': {message}")]
    SegmentAttach {
        /// Configuration name the segment was declared under
        configuration: String,
        /// Underlying failure description
        message: String,
    },

    /// No attached segment matches the requested configuration
    #[error("No segment attached for configuration '{0}'")]
    UnknownConfiguration(String),

    /// The targeted segment was attached read-only
    #[error("Segment for configuration '{0}' is read-only")]
    ReadOnlySegment(String),

    /// The underlying store rejected a commit
    #[error("Commit rejected: {0}")]
    CommitRejected(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
