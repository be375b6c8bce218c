//! Registry of live sessions opted into change propagation
//!
//! The registry never owns a session: it holds weak handles, so a session's
//! natural lifetime (owned by its caller) determines when it disappears.
//! Stale handles are pruned lazily during `sweep` — the one operation that
//! walks the table — which is the sole garbage-collection point.

use crate::atomic_cell::AtomicCell;
use std::sync::{Arc, Weak};

/// Arena of non-owning session handles with lazy liveness-checked pruning
///
/// `register` may race with `sweep` from other threads; both run inside the
/// backing cell's critical section. The callbacks passed to `sweep` execute
/// inside that critical section too, so they must not call back into the
/// same registry.
pub struct SessionRegistry<S> {
    entries: AtomicCell<Vec<Weak<S>>>,
}

impl<S> SessionRegistry<S> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: AtomicCell::new(Vec::new()),
        }
    }

    /// Add a non-owning handle to a live session
    pub fn register(&self, session: &Arc<S>) {
        let weak = Arc::downgrade(session);
        self.entries.mutate(|entries| entries.push(weak));
    }

    /// Walk the table: apply `apply` to every live, non-excluded session
    /// and drop handles whose target is already gone
    ///
    /// `exclude` identifies the session currently in the middle of saving,
    /// which must not be replayed into itself. Excluded sessions stay
    /// registered. Returns the number of stale handles pruned.
    pub fn sweep(
        &self,
        mut exclude: impl FnMut(&Arc<S>) -> bool,
        mut apply: impl FnMut(&Arc<S>),
    ) -> usize {
        self.entries.mutate(|entries| {
            let before = entries.len();
            entries.retain(|weak| match weak.upgrade() {
                Some(session) => {
                    if !exclude(&session) {
                        apply(&session);
                    }
                    true
                }
                None => false,
            });
            before - entries.len()
        })
    }

    /// Number of handles currently held, including not-yet-pruned stale ones
    pub fn len(&self) -> usize {
        self.entries.mutate(|entries| entries.len())
    }

    /// True if no handles are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
