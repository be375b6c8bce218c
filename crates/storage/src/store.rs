//! The store handle
//!
//! `StoreHandle` owns the merged schema, the attached segments, the commit
//! sequence, and the native save-event fan-out. It is the single backing
//! persistent store for a process: sessions take cloned snapshots from it,
//! and the store-rooted session (the writer) applies drained change sets
//! back into it, producing exactly one `SessionSaved` event per successful
//! commit.
//!
//! Commit application is all-or-nothing per change set: a first pass
//! validates every entry against the attached segments (unknown
//! configuration, read-only segment), and only a fully valid set mutates
//! state. Segment persistence failures after the in-memory apply are
//! logged, never propagated — the commit is already visible and the next
//! successful persist writes the full segment contents anyway.

use crate::segment::Segment;
use crate::session::{ChangeSet, Pending};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use storeline_core::{
    ChangeNotification, Error, Record, RecordId, Result, Schema, SessionId, StoreDescription,
};
use tracing::{info, warn};

/// Event emitted once per successful store-level commit
#[derive(Clone, Debug)]
pub struct SessionSaved {
    /// The session that saved (the store-rooted writer)
    pub session: SessionId,
    /// The session whose commit originated the cascade
    pub origin: SessionId,
    /// Position of this commit in the store's total commit order
    pub seq: u64,
    /// What the commit changed
    pub notification: Arc<ChangeNotification>,
}

type Listener = Arc<dyn Fn(&SessionSaved) + Send + Sync>;

struct StoreInner {
    segments: BTreeMap<String, Segment>,
}

impl StoreInner {
    fn configuration_holding(&self, id: &RecordId) -> Option<&str> {
        self.segments
            .iter()
            .find(|(_, seg)| seg.contains(id))
            .map(|(name, _)| name.as_str())
    }
}

/// The single backing persistent store handle
pub struct StoreHandle {
    schema: Schema,
    inner: Mutex<StoreInner>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
    commit_seq: AtomicU64,
}

impl StoreHandle {
    /// Open a store over a merged schema, with no segments attached yet
    ///
    /// Segments are attached individually so the caller can apply its
    /// failure policy (log, delete-on-error retry) per description.
    pub fn open(schema: Schema) -> Arc<Self> {
        Arc::new(Self {
            schema,
            inner: Mutex::new(StoreInner {
                segments: BTreeMap::new(),
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            commit_seq: AtomicU64::new(0),
        })
    }

    /// The merged schema this store was opened with
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Attach one physical segment
    ///
    /// Fails with `Corruption` on a malformed segment file and `Io` on
    /// anything filesystem-level; the caller owns the retry policy.
    /// Re-attaching a configuration replaces the previous segment.
    pub fn attach(&self, description: &StoreDescription) -> Result<()> {
        let segment = Segment::load(description.clone())?;
        let mut inner = self.inner.lock();
        if inner
            .segments
            .insert(description.configuration.clone(), segment)
            .is_some()
        {
            warn!(
                target: "storeline::storage",
                configuration = %description.configuration,
                "segment re-attached, replacing previous"
            );
        } else {
            info!(
                target: "storeline::storage",
                configuration = %description.configuration,
                path = %description.path.display(),
                "segment attached"
            );
        }
        Ok(())
    }

    /// Configuration names currently attached
    pub fn attached_configurations(&self) -> BTreeSet<String> {
        self.inner.lock().segments.keys().cloned().collect()
    }

    /// Description the named configuration was attached with
    pub fn description_for(&self, configuration: &str) -> Option<StoreDescription> {
        self.inner
            .lock()
            .segments
            .get(configuration)
            .map(|seg| seg.description().clone())
    }

    /// Cloned point-in-time view of every visible record
    ///
    /// This is the isolation mechanism sessions build on: the clone is
    /// O(data), which is acceptable for the session-sized working sets
    /// this layer coordinates, and it keeps reads entirely lock-free
    /// once taken.
    pub fn snapshot(&self) -> BTreeMap<RecordId, Record> {
        let inner = self.inner.lock();
        let mut all = BTreeMap::new();
        for segment in inner.segments.values() {
            for record in segment.records() {
                all.insert(record.id, record.clone());
            }
        }
        all
    }

    /// Authoritative state of the given records, where they still exist
    pub fn records_for<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a RecordId>,
    ) -> BTreeMap<RecordId, Record> {
        let inner = self.inner.lock();
        let mut found = BTreeMap::new();
        for id in ids {
            for segment in inner.segments.values() {
                if let Some(record) = segment.get(id) {
                    found.insert(*id, record.clone());
                    break;
                }
            }
        }
        found
    }

    /// Position of the latest commit in the store's total order
    pub fn commit_seq(&self) -> u64 {
        self.commit_seq.load(Ordering::SeqCst)
    }

    /// Apply a drained change set as one commit
    ///
    /// Validates the whole set first (all-or-nothing), mutates segments,
    /// persists the dirty ones, and emits one `SessionSaved` to every
    /// listener. `session` is the saving session, `origin` the session
    /// whose commit originated the cascade.
    pub fn apply(
        &self,
        session: SessionId,
        origin: SessionId,
        changes: &ChangeSet,
    ) -> Result<SessionSaved> {
        let event = {
            let mut inner = self.inner.lock();

            // Validation pass: nothing mutates unless the whole set lands.
            for (id, pending) in changes.entries() {
                match pending {
                    Pending::Upsert(record) => {
                        let configuration = self
                            .schema
                            .configuration_of(&record.kind)
                            .ok_or_else(|| {
                                Error::UnknownConfiguration(record.kind.to_string())
                            })?;
                        let segment = inner.segments.get(configuration).ok_or_else(|| {
                            Error::UnknownConfiguration(configuration.to_string())
                        })?;
                        if segment.is_read_only() {
                            return Err(Error::ReadOnlySegment(configuration.to_string()));
                        }
                    }
                    Pending::Delete => {
                        if let Some(configuration) = inner.configuration_holding(id) {
                            if inner.segments[configuration].is_read_only() {
                                return Err(Error::ReadOnlySegment(configuration.to_string()));
                            }
                        }
                    }
                }
            }

            // Apply pass: classify, mutate, track dirty segments.
            let mut kinds = BTreeSet::new();
            let mut inserted = BTreeSet::new();
            let mut updated = BTreeSet::new();
            let mut deleted = BTreeSet::new();
            let mut dirty = BTreeSet::new();

            for (id, pending) in changes.entries() {
                match pending {
                    Pending::Upsert(record) => {
                        let configuration = self
                            .schema
                            .configuration_of(&record.kind)
                            .expect("validated above")
                            .to_string();
                        let segment = inner
                            .segments
                            .get_mut(&configuration)
                            .expect("validated above");
                        kinds.insert(record.kind.clone());
                        if segment.put(record.clone()).is_some() {
                            updated.insert(*id);
                        } else {
                            inserted.insert(*id);
                        }
                        dirty.insert(configuration);
                    }
                    Pending::Delete => {
                        let holding = inner.configuration_holding(id).map(str::to_string);
                        if let Some(configuration) = holding {
                            let segment = inner
                                .segments
                                .get_mut(&configuration)
                                .expect("holding configuration is attached");
                            if let Some(removed) = segment.remove(id) {
                                kinds.insert(removed.kind);
                                deleted.insert(*id);
                                dirty.insert(configuration);
                            }
                        }
                        // Deleting an absent record is a no-op, not an error.
                    }
                }
            }

            for configuration in &dirty {
                if let Err(e) = inner.segments[configuration].persist() {
                    warn!(
                        target: "storeline::storage",
                        configuration = %configuration,
                        error = %e,
                        "segment persist failed after commit; state remains visible in memory"
                    );
                }
            }

            let seq = self.commit_seq.fetch_add(1, Ordering::SeqCst) + 1;
            SessionSaved {
                session,
                origin,
                seq,
                notification: Arc::new(ChangeNotification::new(
                    kinds, inserted, updated, deleted,
                )),
            }
        };

        self.emit(&event);
        Ok(event)
    }

    /// Register a save-event listener, returning its token
    pub fn subscribe(&self, listener: impl Fn(&SessionSaved) + Send + Sync + 'static) -> u64 {
        let token = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().push((token, Arc::new(listener)));
        token
    }

    /// Remove the listener registered under `token`
    pub fn unsubscribe(&self, token: u64) {
        self.listeners.lock().retain(|(t, _)| *t != token);
    }

    fn emit(&self, event: &SessionSaved) {
        // Listeners run outside the listener lock so a handler can
        // subscribe or unsubscribe without deadlocking.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}
