//! lumen-ask: ask request orchestration
//!
//! This crate owns the lifecycle of a single ask interaction: admission,
//! superseding cancellation, streaming, the bounded multimodal fallback,
//! and completion-time persistence and usage accounting. Collaborators are
//! reached through narrow ports wired in by the composition root.

pub mod broadcast;
pub mod error;
pub mod events;
pub mod fallback;
pub mod handle;
pub mod history;
pub mod orchestrator;
pub mod ports;
pub mod prompt;
pub mod state;

pub use broadcast::StateBroadcaster;
pub use error::{Error, Result};
pub use events::AskEvent;
pub use fallback::is_multimodal_rejection;
pub use handle::AskHandle;
pub use history::{ConversationTurn, HistoryInput};
pub use orchestrator::{AskConfig, AskOrchestrator, SubmitOptions};
pub use ports::{
    AuthGate, ChatTransport, HttpTransport, MessageRole, SessionStore, Surface, UsageReceipt,
    UsageReporter,
};
pub use prompt::{CareerProfile, PromptMode};
pub use state::RequestState;
