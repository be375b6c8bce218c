//! Cross-session change propagation
//!
//! The propagator is the consumer of the writer session's save events. For
//! every commit it:
//! 1. posts one job to the coordinating thread that refreshes the view
//!    session and then invokes the external commit hook (refresh
//!    happens-before notify, and the commit path never blocks on the
//!    coordinating thread), and
//! 2. synchronously replays the change into every still-live registered
//!    session except the one whose commit originated the save, pruning
//!    stale registrations in the same pass.
//!
//! Because commits are serialized on the write lane and step 2 runs inside
//! the save handler, every live session observes change notifications in
//! the store's single commit order — no two notifications interleave.

use std::sync::Arc;
use storeline_concurrency::{AtomicCell, Foreground, SessionRegistry};
use storeline_core::{ChangeNotification, SessionId};
use storeline_storage::{Session, SessionSaved, StoreHandle};
use tracing::debug;

/// Hook invoked on the coordinating thread after each commit is merged
/// into the view session
pub type ChangeHook = dyn Fn(&ChangeNotification) + Send + Sync;

/// Reacts to writer saves: view refresh, external hook, registry replay
pub struct MergePropagator {
    writer: SessionId,
    view: Arc<Session>,
    store: Arc<StoreHandle>,
    registry: Arc<SessionRegistry<Session>>,
    foreground: Arc<dyn Foreground>,
    on_commit: Arc<AtomicCell<Option<Arc<ChangeHook>>>>,
}

impl MergePropagator {
    /// Wire a propagator over the engine's runtime pieces
    pub fn new(
        writer: SessionId,
        view: Arc<Session>,
        store: Arc<StoreHandle>,
        registry: Arc<SessionRegistry<Session>>,
        foreground: Arc<dyn Foreground>,
        on_commit: Arc<AtomicCell<Option<Arc<ChangeHook>>>>,
    ) -> Self {
        Self {
            writer,
            view,
            store,
            registry,
            foreground,
            on_commit,
        }
    }

    /// Handle one save event
    ///
    /// Saves from any session other than the writer carry no committed
    /// state and are ignored.
    pub fn handle(&self, event: &SessionSaved) {
        if event.session != self.writer {
            return;
        }
        let notification = Arc::clone(&event.notification);
        let fresh = Arc::new(
            self.store
                .records_for(notification.refreshed_ids()),
        );

        debug!(
            target: "storeline::engine",
            seq = event.seq,
            changed = notification.len(),
            "propagating commit"
        );

        // View refresh and external hook, in that order, on the
        // coordinating thread. Scheduled asynchronously so the commit path
        // never waits for it.
        let view = Arc::clone(&self.view);
        let hook_cell = Arc::clone(&self.on_commit);
        let fg_notification = Arc::clone(&notification);
        let fg_fresh = Arc::clone(&fresh);
        self.foreground.post(Box::new(move || {
            view.apply_notification(&fg_notification, &fg_fresh);
            if let Some(hook) = hook_cell.read() {
                hook(&fg_notification);
            }
        }));

        // Replay into every live registered session except the commit's
        // origin, each inside its own execution context. This sweep is the
        // registry's only garbage-collection point.
        let origin = event.origin;
        let pruned = self.registry.sweep(
            |session| session.id() == origin,
            |session| session.apply_notification(&notification, &fresh),
        );
        if pruned > 0 {
            debug!(
                target: "storeline::engine",
                pruned,
                "dropped stale session registrations"
            );
        }
    }
}
