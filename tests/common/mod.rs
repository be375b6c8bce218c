//! Shared test utilities for the integration test suites.
//!
//! Import via `mod common;` from any test file.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use storeline::{
    Database, EntityDef, ForegroundThread, Schema, StoreDescription,
};
use tempfile::TempDir;

static INIT_LOGGING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Schema with a single "Message" kind on the default configuration.
pub fn message_schema() -> Schema {
    Schema::new(vec![EntityDef::default_configuration("Message")])
}

/// A database over a temp directory, holding the foreground handle so
/// tests can drain coordinating-thread work deterministically.
pub struct TestDb {
    pub db: Database,
    pub foreground: Arc<ForegroundThread>,
    pub dir: TempDir,
}

impl TestDb {
    /// Database with the message schema and one user-data segment.
    pub fn new() -> Self {
        Self::with_schema(message_schema())
    }

    /// Database with a caller-provided schema and one user-data segment.
    pub fn with_schema(schema: Schema) -> Self {
        init_logging();
        let dir = TempDir::new().unwrap();
        let foreground = Arc::new(ForegroundThread::new());
        let db = Database::builder()
            .schema(schema)
            .store_description(StoreDescription::user_data_store(dir.path()))
            .foreground(foreground.clone())
            .build();
        Self {
            db,
            foreground,
            dir,
        }
    }

    /// Block until every job posted to the coordinating thread has run.
    pub fn flush(&self) {
        self.foreground.flush();
    }
}
