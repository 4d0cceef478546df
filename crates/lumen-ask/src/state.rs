//! Request state owned by the orchestrator

use serde::{Deserialize, Serialize};

/// Mutable state of one ask surface.
///
/// Owned and mutated exclusively by the orchestrator; everything outside
/// sees broadcast snapshot clones. At most one of `loading`/`streaming` is
/// true at any time, and both are false in terminal states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestState {
    /// Whether the interaction surface should be shown
    pub visible: bool,
    /// True between admission and the first streamed token or terminal event
    pub loading: bool,
    /// True while stream events are being consumed
    pub streaming: bool,
    pub current_question: String,
    /// Accumulated response text; the authoritative text to persist
    pub current_response: String,
    /// Presentation hint toggled by admission and completion
    pub show_text_input: bool,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            visible: false,
            loading: false,
            streaming: false,
            current_question: String::new(),
            current_response: String::new(),
            show_text_input: true,
        }
    }
}

impl RequestState {
    /// Whether no request is in flight
    pub fn is_idle(&self) -> bool {
        !self.loading && !self.streaming
    }

    /// Whether the surface has anything worth keeping on screen
    pub fn has_content(&self) -> bool {
        self.loading || self.streaming || !self.current_response.is_empty()
    }
}
