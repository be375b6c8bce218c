//! Bridge onto the store's native change-notification mechanism
//!
//! Nothing else in the engine touches the store's listener surface: the
//! bridge owns the one subscription the propagator needs and tears it down
//! when the engine's runtime goes away, so a dropped database can never
//! receive a stale save event.

use std::sync::Arc;
use storeline_storage::{SessionSaved, StoreHandle};

/// RAII handle over one store save-event subscription
pub struct NotificationBridge {
    store: Arc<StoreHandle>,
    token: u64,
}

impl NotificationBridge {
    /// Subscribe `handler` to the store's save events
    pub fn subscribe(
        store: &Arc<StoreHandle>,
        handler: impl Fn(&SessionSaved) + Send + Sync + 'static,
    ) -> Self {
        let token = store.subscribe(handler);
        Self {
            store: Arc::clone(store),
            token,
        }
    }

    /// The subscription token held by this bridge
    pub fn token(&self) -> u64 {
        self.token
    }
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        self.store.unsubscribe(self.token);
    }
}
