//! State broadcaster: pushes snapshots to subscribed surfaces

use tokio::sync::broadcast;

use crate::{events::AskEvent, state::RequestState};

/// Fans orchestrator notifications out to subscribers.
///
/// Sends are fire-and-forget: having no subscriber is legal, and a lagging
/// subscriber only loses intermediate snapshots, never the ordering of the
/// ones it does see.
pub struct StateBroadcaster {
    tx: broadcast::Sender<AskEvent>,
}

impl StateBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Subscribe to orchestrator notifications
    pub fn subscribe(&self) -> broadcast::Receiver<AskEvent> {
        self.tx.subscribe()
    }

    /// Push a state snapshot
    pub fn state(&self, state: RequestState) {
        let _ = self.tx.send(AskEvent::StateUpdate { state });
    }

    /// Push a terminal stream-error notification
    pub fn stream_error(&self, error: impl Into<String>) {
        let _ = self.tx.send(AskEvent::StreamError {
            error: error.into(),
        });
    }
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
