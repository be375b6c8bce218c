//! The database handle
//!
//! `Database` is the single logical handle callers hold. Internally it
//! owns the lazily-initialized store, the private writer session (the only
//! session that persists mutations), the long-lived read-only view
//! session, the serialized write lane, and the registry of caller-owned
//! sessions opted into change propagation.
//!
//! Initialization is an explicit gate — `Uninitialized -> Initializing ->
//! Ready` behind one mutex — so concurrent first accesses block behind a
//! single build instead of racing. The build merges the declared schemas,
//! opens the store, and attaches one segment per declared configuration,
//! applying each description's delete-on-error policy (log, delete the
//! files, retry exactly once).
//!
//! Error policy at this boundary: storage failures are logged and turn
//! into absent results. A write closure whose commit is rejected gets no
//! result back; it never sees an error object.
//!
//! Lock ordering, outermost first: write-lane turn, session (child before
//! parent), store interior, registry cell, replayed sessions. Session
//! reads come from owned snapshots and never take parent locks, which is
//! what keeps the propagation path cycle-free.

use crate::bridge::NotificationBridge;
use crate::propagator::MergePropagator;
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use storeline_concurrency::{
    AtomicCell, Foreground, ForegroundThread, SessionRegistry, WriteQueue,
};
use storeline_core::{ChangeNotification, Result, Schema, StoreDescription};
use storeline_storage::{MergePolicy, Session, SessionTx, StoreHandle};
use tracing::{error, info, warn};

pub use crate::propagator::ChangeHook;

/// Whether a caller-owned session takes part in change propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participation {
    /// The session never receives other commits' changes
    Isolated,
    /// The session is registered (weakly) and replayed on every commit
    Merged,
}

/// Counters describing the coordinator's activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    /// Times the store build sequence ran (1 after any successful use)
    pub initializations: u64,
    /// Write jobs whose commit cascade succeeded
    pub commits: u64,
    /// Segment attachments retried under the delete-on-error policy
    pub segment_retries: u64,
    /// Session registrations currently held, stale ones included
    pub registered_sessions: usize,
}

enum Gate {
    Uninitialized,
    Initializing,
    Ready(Arc<Runtime>),
}

struct Runtime {
    store: Arc<StoreHandle>,
    writer: Arc<Session>,
    view: Arc<Session>,
    _bridge: NotificationBridge,
}

struct Inner {
    gate: Mutex<Gate>,
    gate_cond: Condvar,
    foreground: Arc<dyn Foreground>,
    queue: WriteQueue,
    registry: Arc<SessionRegistry<Session>>,
    descriptions: Vec<StoreDescription>,
    schema: Schema,
    custom_schema: Option<Schema>,
    on_commit: Arc<AtomicCell<Option<Arc<ChangeHook>>>>,
    initializations: AtomicU64,
    commits: AtomicU64,
    segment_retries: AtomicU64,
}

/// One logical database handle over the coordinated store
///
/// Cheap to clone; all clones share the same coordination state.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    /// Start configuring a database
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// The long-lived read-only view session
    ///
    /// Always reflects the latest committed state once the propagation of
    /// a commit reaches the coordinating thread. Mutating or committing
    /// through it panics.
    pub fn view_session(&self) -> Result<Arc<Session>> {
        Ok(Arc::clone(&self.inner.ensure_ready()?.view))
    }

    /// Run a write closure on the serialized write lane, fire-and-forget
    ///
    /// The closure gets a fresh private session (child of the writer); its
    /// changes are committed — session, then writer — after it returns.
    /// Commit failures are logged, never surfaced.
    pub fn perform_write(&self, work: impl FnOnce(&mut SessionTx<'_>) + Send + 'static) {
        let inner = Arc::clone(&self.inner);
        self.inner.queue.run_async(move || {
            let _ = inner.write_job(work);
        });
    }

    /// Run a write closure on the serialized write lane and wait for it
    ///
    /// Returns the closure's value, or `None` if initialization or the
    /// commit cascade failed (the failure is logged).
    pub fn perform_write_sync<T, F>(&self, work: F) -> Option<T>
    where
        F: FnOnce(&mut SessionTx<'_>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.inner.queue.run(move || inner.write_job(work))
    }

    /// Run a read closure against a fresh store-rooted session,
    /// fire-and-forget on a background thread
    ///
    /// Reads never touch the write lane, so they never wait behind
    /// writes. The session is discarded afterwards; nothing commits.
    pub fn perform_read(&self, work: impl FnOnce(&mut SessionTx<'_>) + Send + 'static) {
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("storeline-read".to_string())
            .spawn(move || {
                let _ = inner.read_job(work);
            });
        if let Err(e) = spawned {
            error!(target: "storeline::engine", error = %e, "failed to spawn read thread");
        }
    }

    /// Run a read closure against a fresh store-rooted session, inline
    ///
    /// Returns the closure's value, or `None` if initialization failed.
    pub fn perform_read_sync<T>(&self, work: impl FnOnce(&mut SessionTx<'_>) -> T) -> Option<T> {
        self.inner.read_job(work)
    }

    /// Create a caller-owned private write session (child of the writer)
    ///
    /// With `Participation::Merged` the coordinator holds only a weak
    /// registration: dropping the session is always safe and it falls out
    /// of propagation on the next commit cycle. Save the session through
    /// [`Database::save_session`] so its commit takes the write lane.
    pub fn private_session(&self, participation: Participation) -> Result<Arc<Session>> {
        let runtime = self.inner.ensure_ready()?;
        let session = Session::child_of(&runtime.writer, false, MergePolicy::Preserve);
        if participation == Participation::Merged {
            self.inner.registry.register(&session);
        }
        Ok(session)
    }

    /// Commit a caller-owned session through the serialized write lane
    ///
    /// Thread-aware like `perform_write`: fire-and-forget from the
    /// coordinating thread, synchronous from any other.
    pub fn save_session(&self, session: &Arc<Session>) {
        let inner = Arc::clone(&self.inner);
        let session = Arc::clone(session);
        self.inner.queue.run_async(move || {
            inner.save_job(&session);
        });
    }

    /// Replace the hook invoked on the coordinating thread after each
    /// commit reaches the view session
    pub fn set_on_change_committed(
        &self,
        hook: impl Fn(&ChangeNotification) + Send + Sync + 'static,
    ) {
        self.inner.on_commit.write(Some(Arc::new(hook)));
    }

    /// The description the named configuration was declared with
    pub fn description_for(&self, configuration: &str) -> Option<StoreDescription> {
        self.inner
            .descriptions
            .iter()
            .find(|d| d.configuration == configuration)
            .cloned()
    }

    /// Segment file location for the named configuration
    pub fn store_path(&self, configuration: &str) -> Option<PathBuf> {
        self.description_for(configuration).map(|d| d.path)
    }

    /// Current activity counters
    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            initializations: self.inner.initializations.load(Ordering::SeqCst),
            commits: self.inner.commits.load(Ordering::SeqCst),
            segment_retries: self.inner.segment_retries.load(Ordering::SeqCst),
            registered_sessions: self.inner.registry.len(),
        }
    }
}

impl Inner {
    /// Block until the store is `Ready`, building it if this caller is
    /// first
    ///
    /// Exactly one caller performs the build; everyone arriving during
    /// `Initializing` waits on the condvar rather than observing a
    /// partially-built store.
    fn ensure_ready(&self) -> Result<Arc<Runtime>> {
        let mut gate = self.gate.lock();
        loop {
            match &*gate {
                Gate::Ready(runtime) => return Ok(Arc::clone(runtime)),
                Gate::Initializing => self.gate_cond.wait(&mut gate),
                Gate::Uninitialized => {
                    *gate = Gate::Initializing;
                    drop(gate);
                    let built = self.build_runtime();
                    gate = self.gate.lock();
                    match built {
                        Ok(runtime) => {
                            *gate = Gate::Ready(Arc::clone(&runtime));
                            self.gate_cond.notify_all();
                            return Ok(runtime);
                        }
                        Err(e) => {
                            // Leave the gate reopenable so a later call can
                            // retry the build.
                            *gate = Gate::Uninitialized;
                            self.gate_cond.notify_all();
                            error!(target: "storeline::engine", error = %e, "store initialization failed");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    fn build_runtime(&self) -> Result<Arc<Runtime>> {
        self.initializations.fetch_add(1, Ordering::SeqCst);

        let mut schema = self.schema.clone();
        if let Some(custom) = &self.custom_schema {
            schema = schema.merge(custom);
        }

        let store = StoreHandle::open(schema.clone());
        for configuration in schema.configurations() {
            match self
                .descriptions
                .iter()
                .find(|d| d.configuration == configuration)
            {
                Some(description) => self.attach_with_retry(&store, description),
                None => warn!(
                    target: "storeline::engine",
                    configuration = %configuration,
                    "no store description for declared configuration; left unattached"
                ),
            }
        }

        let writer = Session::rooted(&store, false, MergePolicy::Incoming);
        let view = Session::child_of(&writer, true, MergePolicy::Rollback);

        let propagator = MergePropagator::new(
            writer.id(),
            Arc::clone(&view),
            Arc::clone(&store),
            Arc::clone(&self.registry),
            Arc::clone(&self.foreground),
            Arc::clone(&self.on_commit),
        );
        let bridge = NotificationBridge::subscribe(&store, move |event| propagator.handle(event));

        info!(
            target: "storeline::engine",
            configurations = ?store.attached_configurations(),
            "store initialized"
        );

        Ok(Arc::new(Runtime {
            store,
            writer,
            view,
            _bridge: bridge,
        }))
    }

    /// Attach one segment, honoring its delete-on-error policy
    ///
    /// One retry, never more: a segment that fails twice stays unattached
    /// and operations routed to its configuration fail individually.
    fn attach_with_retry(&self, store: &Arc<StoreHandle>, description: &StoreDescription) {
        let first = match store.attach(description) {
            Ok(()) => return,
            Err(e) => e,
        };
        warn!(
            target: "storeline::engine",
            configuration = %description.configuration,
            error = %first,
            "segment attach failed"
        );
        if !description.delete_on_error {
            return;
        }
        if let Err(e) = description.remove_store_files() {
            error!(
                target: "storeline::engine",
                configuration = %description.configuration,
                error = %e,
                "could not remove segment files; configuration left unattached"
            );
            return;
        }
        self.segment_retries.fetch_add(1, Ordering::SeqCst);
        match store.attach(description) {
            Ok(()) => info!(
                target: "storeline::engine",
                configuration = %description.configuration,
                "segment attached after delete-on-error retry"
            ),
            Err(e) => error!(
                target: "storeline::engine",
                configuration = %description.configuration,
                error = %e,
                "segment attach failed after retry; configuration left unattached"
            ),
        }
    }

    /// One write job on the lane: fresh child session, closure, cascade
    fn write_job<T>(&self, work: impl FnOnce(&mut SessionTx<'_>) -> T) -> Option<T> {
        let runtime = match self.ensure_ready() {
            Ok(runtime) => runtime,
            Err(_) => return None,
        };
        let session = Session::child_of(&runtime.writer, false, MergePolicy::Preserve);
        let value = session.perform(work);
        match session
            .commit()
            .and_then(|()| runtime.writer.commit_from(session.id()))
        {
            Ok(()) => {
                self.commits.fetch_add(1, Ordering::SeqCst);
                Some(value)
            }
            Err(e) => {
                error!(target: "storeline::engine", error = %e, "write commit failed");
                None
            }
        }
    }

    /// Commit a caller-owned session and cascade it through the writer
    fn save_job(&self, session: &Arc<Session>) {
        let runtime = match self.ensure_ready() {
            Ok(runtime) => runtime,
            Err(_) => return,
        };
        match session
            .commit()
            .and_then(|()| runtime.writer.commit_from(session.id()))
        {
            Ok(()) => {
                self.commits.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                error!(target: "storeline::engine", error = %e, "session save failed");
            }
        }
    }

    /// One read job: fresh store-rooted session, closure, discard
    fn read_job<T>(&self, work: impl FnOnce(&mut SessionTx<'_>) -> T) -> Option<T> {
        let runtime = match self.ensure_ready() {
            Ok(runtime) => runtime,
            Err(_) => return None,
        };
        let session = Session::rooted(&runtime.store, false, MergePolicy::Preserve);
        Some(session.perform(work))
    }
}

/// Fluent configuration for [`Database`]
///
/// ```ignore
/// let db = Database::builder()
///     .schema(schema)
///     .store_description(StoreDescription::user_data_store("/data/app"))
///     .build();
/// ```
pub struct DatabaseBuilder {
    descriptions: Vec<StoreDescription>,
    schema: Schema,
    custom_schema: Option<Schema>,
    foreground: Option<Arc<dyn Foreground>>,
    on_commit: Option<Arc<ChangeHook>>,
}

impl DatabaseBuilder {
    /// Builder with no schema, no descriptions, a dedicated foreground
    pub fn new() -> Self {
        Self {
            descriptions: Vec::new(),
            schema: Schema::default(),
            custom_schema: None,
            foreground: None,
            on_commit: None,
        }
    }

    /// Set the default data-model schema
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Merge an additional schema source over the default one
    pub fn custom_schema(mut self, schema: Schema) -> Self {
        self.custom_schema = Some(schema);
        self
    }

    /// Add one store description
    pub fn store_description(mut self, description: StoreDescription) -> Self {
        self.descriptions.push(description);
        self
    }

    /// Replace all store descriptions
    pub fn store_descriptions(mut self, descriptions: Vec<StoreDescription>) -> Self {
        self.descriptions = descriptions;
        self
    }

    /// Use an embedder-provided coordinating thread
    ///
    /// Defaults to a dedicated [`ForegroundThread`].
    pub fn foreground(mut self, foreground: Arc<dyn Foreground>) -> Self {
        self.foreground = Some(foreground);
        self
    }

    /// Install the commit hook up front
    pub fn on_change_committed(
        mut self,
        hook: impl Fn(&ChangeNotification) + Send + Sync + 'static,
    ) -> Self {
        self.on_commit = Some(Arc::new(hook));
        self
    }

    /// Build the handle; the store itself initializes lazily on first use
    pub fn build(self) -> Database {
        let foreground = self
            .foreground
            .unwrap_or_else(|| Arc::new(ForegroundThread::new()));
        let queue = WriteQueue::new(Arc::clone(&foreground));
        Database {
            inner: Arc::new(Inner {
                gate: Mutex::new(Gate::Uninitialized),
                gate_cond: Condvar::new(),
                foreground,
                queue,
                registry: Arc::new(SessionRegistry::new()),
                descriptions: self.descriptions,
                schema: self.schema,
                custom_schema: self.custom_schema,
                on_commit: Arc::new(AtomicCell::new(self.on_commit)),
                initializations: AtomicU64::new(0),
                commits: AtomicU64::new(0),
                segment_retries: AtomicU64::new(0),
            }),
        }
    }
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storeline_core::EntityDef;
    use tempfile::TempDir;

    fn database(dir: &TempDir) -> Database {
        Database::builder()
            .schema(Schema::new(vec![EntityDef::default_configuration("Message")]))
            .store_description(StoreDescription::user_data_store(dir.path()))
            .build()
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let db = database(&dir);

        let rec = db
            .perform_write_sync(|tx| tx.insert("Message", json!({"body": "hi"})))
            .unwrap();

        let found = db
            .perform_read_sync(|tx| tx.get(&rec.id))
            .unwrap()
            .unwrap();
        assert_eq!(found.payload["body"], "hi");
    }

    #[test]
    fn test_initialization_runs_once() {
        let dir = TempDir::new().unwrap();
        let db = database(&dir);
        db.view_session().unwrap();
        db.perform_read_sync(|tx| tx.all("Message").len()).unwrap();
        db.perform_write_sync(|_| ()).unwrap();
        assert_eq!(db.metrics().initializations, 1);
    }

    #[test]
    fn test_write_commit_failure_yields_none() {
        let dir = TempDir::new().unwrap();
        let db = database(&dir);
        // "Task" is not declared, so the cascade is rejected at the store.
        let result = db.perform_write_sync(|tx| {
            tx.insert("Task", json!({}));
            "value"
        });
        assert!(result.is_none());
        assert_eq!(db.metrics().commits, 0);
    }

    #[test]
    fn test_custom_schema_merges_over_default() {
        let dir = TempDir::new().unwrap();
        let db = Database::builder()
            .schema(Schema::new(vec![EntityDef::default_configuration("Message")]))
            .custom_schema(Schema::new(vec![EntityDef::default_configuration("Task")]))
            .store_description(StoreDescription::user_data_store(dir.path()))
            .build();
        let rec = db
            .perform_write_sync(|tx| tx.insert("Task", json!({})))
            .unwrap();
        assert!(db
            .perform_read_sync(|tx| tx.get(&rec.id))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_description_accessors() {
        let dir = TempDir::new().unwrap();
        let db = database(&dir);
        let desc = db.description_for("default").unwrap();
        assert!(desc.delete_on_error);
        assert_eq!(db.store_path("default").unwrap(), desc.path);
        assert!(db.description_for("absent").is_none());
    }

    #[test]
    #[should_panic(expected = "read-only session cannot be mutated")]
    fn test_view_session_mutation_panics() {
        let dir = TempDir::new().unwrap();
        let db = database(&dir);
        let view = db.view_session().unwrap();
        view.perform(|tx| {
            tx.insert("Message", json!({}));
        });
    }

    #[test]
    fn test_reads_never_touch_the_write_lane() {
        let dir = TempDir::new().unwrap();
        let db = database(&dir);
        db.perform_write_sync(|tx| {
            tx.insert("Message", json!({}));
        });

        // A read issued from inside a write job completes even though the
        // lane is busy with that very job: the read path never touches the
        // queue, only the store.
        let db2 = db.clone();
        let count = db
            .perform_write_sync(move |_| db2.perform_read_sync(|tx| tx.all("Message").len()))
            .unwrap();
        assert_eq!(count, Some(1));
    }
}
