//! Engine event bus.
//!
//! Recovery and UI routing subscribe here instead of being chained
//! inline: an operation that hits an invalid space emits
//! `ContextInvalidated` and returns; whoever handles re-selection acts
//! on the event and re-renders from root afterwards.

use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A new space became active; all listing caches were invalidated.
    ContextChanged { space_id: String },
    /// The active space no longer exists or is inaccessible; a
    /// re-selection is required before further tree operations.
    ContextInvalidated { space_id: String },
    /// An operation required an active space and none is selected.
    NoActiveSpace,
}

/// Broadcast fan-out for [`EngineEvent`]s. Cheap to clone; all clones
/// share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Having no subscribers is fine; events are
    /// advisory.
    pub fn emit(&self, event: EngineEvent) {
        debug!(?event, "engine event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
