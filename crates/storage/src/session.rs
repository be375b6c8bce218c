//! Sessions: isolated, single-execution-context views over store data
//!
//! A session reads from a cloned snapshot taken at creation and stages its
//! mutations in a pending overlay. Nothing a session does is visible
//! elsewhere until it commits: a child session's commit drains the overlay
//! into its parent's overlay (incoming wins), and a store-rooted session's
//! commit applies the overlay to the store, which emits the save event.
//!
//! Confinement: all record access happens inside `perform`, which holds
//! the session's own lock for the closure's duration. Entering `perform`
//! re-entrantly on the same session deadlocks by design, exactly like
//! `AtomicCell::mutate`.

use crate::store::StoreHandle;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use storeline_core::{ChangeNotification, EntityKind, Record, RecordId, Result, SessionId};

/// Conflict-resolution rule applied when a session receives a
/// `ChangeNotification` while holding local uncommitted edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Freshly-saved data is authoritative: local pending edits to notified
    /// records are dropped so the incoming state shows through. Used by the
    /// writer session, which must never silently discard saved data.
    Incoming,
    /// Discard all local pending edits and trust the incoming state
    /// wholesale. Used by the read-only view session.
    Rollback,
    /// Refresh the base snapshot but keep local pending edits untouched, so
    /// an unrelated in-flight edit still commits later. Used by private
    /// sessions registered for propagation.
    Preserve,
}

/// One staged mutation
#[derive(Debug, Clone)]
pub enum Pending {
    /// Insert or replace the record
    Upsert(Record),
    /// Remove the record
    Delete,
}

/// A drained set of staged mutations, keyed by record identifier
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    entries: BTreeMap<RecordId, Pending>,
}

impl ChangeSet {
    /// Build a change set from drained entries
    pub fn from_entries(entries: BTreeMap<RecordId, Pending>) -> Self {
        Self { entries }
    }

    /// Stage one mutation, replacing any staged one for the same record
    pub fn stage(&mut self, id: RecordId, pending: Pending) {
        self.entries.insert(id, pending);
    }

    /// Iterate staged mutations in identifier order
    pub fn entries(&self) -> impl Iterator<Item = (&RecordId, &Pending)> {
        self.entries.iter()
    }

    /// Number of staged mutations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is staged
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn into_entries(self) -> BTreeMap<RecordId, Pending> {
        self.entries
    }
}

enum SessionParent {
    Store(Arc<StoreHandle>),
    Session(Arc<Session>),
}

struct SessionState {
    snapshot: BTreeMap<RecordId, Record>,
    pending: BTreeMap<RecordId, Pending>,
}

impl SessionState {
    fn visible(&self) -> BTreeMap<RecordId, Record> {
        let mut records = self.snapshot.clone();
        for (id, pending) in &self.pending {
            match pending {
                Pending::Upsert(record) => {
                    records.insert(*id, record.clone());
                }
                Pending::Delete => {
                    records.remove(id);
                }
            }
        }
        records
    }

    fn advance_snapshot(&mut self, changes: &ChangeSet) {
        for (id, pending) in changes.entries() {
            match pending {
                Pending::Upsert(record) => {
                    self.snapshot.insert(*id, record.clone());
                }
                Pending::Delete => {
                    self.snapshot.remove(id);
                }
            }
        }
    }
}

/// An isolated view over the store's data, supporting local mutation
/// before commit
pub struct Session {
    id: SessionId,
    read_only: bool,
    policy: MergePolicy,
    parent: SessionParent,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create a session rooted directly at the store
    pub fn rooted(store: &Arc<StoreHandle>, read_only: bool, policy: MergePolicy) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new(),
            read_only,
            policy,
            parent: SessionParent::Store(Arc::clone(store)),
            state: Mutex::new(SessionState {
                snapshot: store.snapshot(),
                pending: BTreeMap::new(),
            }),
        })
    }

    /// Create a session whose commits cascade into `parent`
    ///
    /// The child's snapshot is the parent's currently visible state, so a
    /// child opened mid-edit sees its parent's staged changes.
    pub fn child_of(parent: &Arc<Session>, read_only: bool, policy: MergePolicy) -> Arc<Self> {
        let snapshot = parent.visible_records();
        Arc::new(Self {
            id: SessionId::new(),
            read_only,
            policy,
            parent: SessionParent::Session(Arc::clone(parent)),
            state: Mutex::new(SessionState {
                snapshot,
                pending: BTreeMap::new(),
            }),
        })
    }

    /// Identity of this session object
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// True if mutation and commit are forbidden
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// This session's merge policy
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Run `f` as this session's active execution context
    ///
    /// The session's lock is held for the whole closure; this is the only
    /// way to touch the session's records.
    pub fn perform<R>(&self, f: impl FnOnce(&mut SessionTx<'_>) -> R) -> R {
        let mut state = self.state.lock();
        let mut tx = SessionTx {
            session: self,
            state: &mut state,
        };
        f(&mut tx)
    }

    /// True if the session holds uncommitted edits
    pub fn has_changes(&self) -> bool {
        !self.state.lock().pending.is_empty()
    }

    /// Discard all uncommitted edits
    pub fn rollback(&self) {
        self.state.lock().pending.clear();
    }

    /// The session's currently visible state: snapshot plus pending overlay
    pub fn visible_records(&self) -> BTreeMap<RecordId, Record> {
        self.state.lock().visible()
    }

    /// Commit this session's pending edits
    ///
    /// Equivalent to `commit_from` with this session as the origin.
    ///
    /// # Panics
    ///
    /// Panics if the session is read-only: committing through the view
    /// session is a programming error, not a runtime condition.
    pub fn commit(&self) -> Result<()> {
        self.commit_from(self.id)
    }

    /// Commit, attributing the resulting save event to `origin`
    ///
    /// The engine uses this to cascade a private session's save through the
    /// writer while keeping the originating session identifiable, so
    /// propagation can exclude exactly that session from its own
    /// notification loop.
    ///
    /// On failure the drained edits are restored (the session's in-memory
    /// state is left as it was, not rolled back).
    pub fn commit_from(&self, origin: SessionId) -> Result<()> {
        assert!(
            !self.read_only,
            "read-only session cannot commit; use a write session"
        );
        let drained = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                return Ok(());
            }
            ChangeSet::from_entries(mem::take(&mut state.pending))
        };
        match &self.parent {
            SessionParent::Session(parent) => {
                parent.absorb(&drained);
                // The session keeps seeing what it just saved.
                self.state.lock().advance_snapshot(&drained);
                Ok(())
            }
            SessionParent::Store(store) => match store.apply(self.id, origin, &drained) {
                Ok(_event) => {
                    self.state.lock().advance_snapshot(&drained);
                    Ok(())
                }
                Err(e) => {
                    let mut state = self.state.lock();
                    for (id, pending) in drained.into_entries() {
                        state.pending.entry(id).or_insert(pending);
                    }
                    Err(e)
                }
            },
        }
    }

    /// Absorb a child's drained edits into this session's overlay
    ///
    /// Incoming edits overwrite whatever this session had staged for the
    /// same records: the freshly-saved data is authoritative.
    pub fn absorb(&self, changes: &ChangeSet) {
        let mut state = self.state.lock();
        for (id, pending) in changes.entries() {
            state.pending.insert(*id, pending.clone());
        }
    }

    /// Apply a committed change to this session per its merge policy
    ///
    /// `fresh` carries the authoritative state of the notification's
    /// inserted/updated records, pre-fetched by the caller so sessions are
    /// refreshed without touching the store from inside their own lock.
    pub fn apply_notification(
        &self,
        notification: &ChangeNotification,
        fresh: &BTreeMap<RecordId, Record>,
    ) {
        let mut state = self.state.lock();
        match self.policy {
            MergePolicy::Rollback => state.pending.clear(),
            MergePolicy::Incoming => {
                for id in notification.refreshed_ids() {
                    state.pending.remove(id);
                }
                for id in &notification.deleted {
                    state.pending.remove(id);
                }
            }
            MergePolicy::Preserve => {}
        }
        for id in notification.refreshed_ids() {
            if let Some(record) = fresh.get(id) {
                state.snapshot.insert(*id, record.clone());
            }
        }
        for id in &notification.deleted {
            state.snapshot.remove(id);
        }
    }
}

/// A session's active execution context
///
/// Borrowed exclusively inside [`Session::perform`]; every operation works
/// against the session's snapshot-plus-overlay view.
pub struct SessionTx<'a> {
    session: &'a Session,
    state: &'a mut SessionState,
}

impl SessionTx<'_> {
    fn assert_writable(&self) {
        assert!(
            !self.session.read_only,
            "read-only session cannot be mutated; use a write session"
        );
    }

    /// Stage a new record of `kind`, returning it with its fresh identifier
    pub fn insert(&mut self, kind: impl Into<EntityKind>, payload: serde_json::Value) -> Record {
        self.assert_writable();
        let record = Record::new(kind, payload);
        self.state
            .pending
            .insert(record.id, Pending::Upsert(record.clone()));
        record
    }

    /// Stage a replacement for an existing record
    pub fn update(&mut self, record: Record) {
        self.assert_writable();
        self.state
            .pending
            .insert(record.id, Pending::Upsert(record));
    }

    /// Stage a deletion; true if the record was visible to this session
    pub fn delete(&mut self, id: RecordId) -> bool {
        self.assert_writable();
        let was_visible = match self.state.pending.get(&id) {
            Some(Pending::Upsert(_)) => true,
            Some(Pending::Delete) => false,
            None => self.state.snapshot.contains_key(&id),
        };
        self.state.pending.insert(id, Pending::Delete);
        was_visible
    }

    /// Read one record as this session sees it
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        match self.state.pending.get(id) {
            Some(Pending::Upsert(record)) => Some(record.clone()),
            Some(Pending::Delete) => None,
            None => self.state.snapshot.get(id).cloned(),
        }
    }

    /// Records of `kind` matching `predicate`, in identifier order
    pub fn find(
        &self,
        kind: impl Into<EntityKind>,
        predicate: impl Fn(&Record) -> bool,
    ) -> Vec<Record> {
        let kind = kind.into();
        self.state
            .visible()
            .into_values()
            .filter(|r| r.kind == kind && predicate(r))
            .collect()
    }

    /// All records of `kind`, in identifier order
    pub fn all(&self, kind: impl Into<EntityKind>) -> Vec<Record> {
        self.find(kind, |_| true)
    }

    /// True if this session holds uncommitted edits
    pub fn has_changes(&self) -> bool {
        !self.state.pending.is_empty()
    }
}
