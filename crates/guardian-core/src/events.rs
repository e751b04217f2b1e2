//! Engine events and the bus that publishes them.
//!
//! The presentation layer never reads engine internals directly. It renders
//! from `SyncEngine::snapshot` and reacts to `EngineEvent`s delivered through
//! an `EventBus` subscription.

use crate::cache::ContentField;
use crate::debounce::Channel;
use crate::engine::DerivationMode;
use crate::models::DocumentId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Something the engine did that a subscriber may want to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// Selection moved (to `None` when cleared).
    SelectionChanged { document: Option<DocumentId> },
    /// Initial load finished for the selected document.
    Loaded {
        document: DocumentId,
        /// The preview fetch failed and the original is shown in its place.
        degraded: bool,
    },
    /// A buffer field changed, either by a user edit or an applied preview.
    ContentChanged {
        document: DocumentId,
        field: ContentField,
    },
    /// A field was written to the store.
    Persisted {
        document: DocumentId,
        field: ContentField,
    },
    /// A background save or derive failed. Not shown to the user.
    BackgroundFailure {
        document: DocumentId,
        channel: Channel,
        message: String,
    },
    /// An async result arrived after the selection had moved on.
    StaleResultDropped {
        document: DocumentId,
        operation: &'static str,
    },
    ModeChanged { mode: DerivationMode },
    /// User-visible message (explicit action outcome).
    Notice { level: NoticeLevel, message: String },
}

type Listener = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_id: BTreeMap<u64, Listener>,
}

/// Fans engine events out to listeners in subscription order.
///
/// Clones publish to the same listeners. Listeners run on the emitting
/// thread with no lock held, so they may subscribe or drop subscriptions.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Listeners>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
        listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, listener: impl Fn(&EngineEvent) + Send + Sync + 'static) -> Subscription {
        let mut listeners = Self::lock(&self.listeners);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.by_id.insert(id, Arc::new(listener));
        Subscription {
            listeners: Arc::downgrade(&self.listeners),
            id,
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        let listeners: Vec<Listener> = Self::lock(&self.listeners).by_id.values().cloned().collect();
        for listener in listeners {
            listener(&event);
        }
    }
}

/// Keeps a listener registered until dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    listeners: Weak<Mutex<Listeners>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            EventBus::lock(&listeners).by_id.remove(&self.id);
        }
    }
}
