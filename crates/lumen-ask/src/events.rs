//! Events pushed to the presentation surface

use serde::{Deserialize, Serialize};

use crate::state::RequestState;

/// Notifications emitted by the orchestrator.
///
/// State snapshots go out on every admission, every content delta, and
/// every terminal transition. Stream errors are a distinct notification so
/// the surface can render a failure without conflating it with idle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AskEvent {
    /// Full state snapshot
    StateUpdate { state: RequestState },
    /// Terminal, non-recoverable failure
    StreamError { error: String },
}

impl AskEvent {
    /// Check if this is an error notification
    pub fn is_error(&self) -> bool {
        matches!(self, AskEvent::StreamError { .. })
    }
}
