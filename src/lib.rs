//! Storeline — a concurrency-coordination layer in front of a persistent
//! object store
//!
//! Storeline gives callers a single logical database handle while
//! internally managing many short-lived write sessions and one long-lived
//! read snapshot. Writes serialize on one lane and commit one at a time;
//! every other live session — the view session and any registered private
//! session — observes each commit exactly once, in commit order.
//!
//! # Quick Start
//!
//! ```ignore
//! use storeline::{Database, EntityDef, Schema, StoreDescription};
//!
//! let db = Database::builder()
//!     .schema(Schema::new(vec![EntityDef::default_configuration("Message")]))
//!     .store_description(StoreDescription::user_data_store("/data/app"))
//!     .build();
//!
//! // Mutate through a private write session on the serialized lane.
//! db.perform_write(|tx| {
//!     tx.insert("Message", serde_json::json!({"body": "hello"}));
//! });
//!
//! // Present from the read-only view session.
//! let view = db.view_session()?;
//! let messages = view.perform(|tx| tx.all("Message"));
//! ```
//!
//! # Architecture
//!
//! The engine crate owns cross-layer coordination (lazy store
//! initialization, the writer/view session pair, change propagation);
//! the storage crate is the backing object store with snapshot-isolated
//! sessions; the concurrency crate holds the primitives both build on.

pub use storeline_concurrency::{
    AtomicCell, Foreground, ForegroundThread, SessionRegistry, WriteQueue,
};
pub use storeline_core::{
    ChangeNotification, EntityDef, EntityKind, Error, Record, RecordId, Result, Schema,
    SessionId, StoreDescription,
};
pub use storeline_engine::{
    ChangeHook, CoordinatorMetrics, Database, DatabaseBuilder, NotificationBridge,
    Participation,
};
pub use storeline_storage::{MergePolicy, Session, SessionSaved, SessionTx, StoreHandle};
