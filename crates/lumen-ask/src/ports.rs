//! Narrow collaborator interfaces
//!
//! The orchestrator depends only on these ports, never on concrete
//! presentation, auth, or storage modules; the composition root wires the
//! implementations in once at startup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use lumen_ai::{ChatClient, ChatMessage, ModelConfig, ProviderEventStream};

/// Role of a persisted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Auth query port: is there a logged-in user?
pub trait AuthGate: Send + Sync {
    fn is_authenticated(&self) -> bool;
}

/// Session visibility port onto the presentation surface
pub trait Surface: Send + Sync {
    /// Whether the surface still exists to receive a stream
    fn is_available(&self) -> bool;
    /// Ask the surface to show or hide itself
    fn request_visibility(&self, visible: bool);
}

/// Durable storage port for sessions and messages
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the active session of the given kind, creating one if needed
    async fn create_or_reuse_active(&self, kind: &str) -> Result<String>;
    /// Append a message to a session
    async fn append_message(&self, session_id: &str, role: MessageRole, text: &str) -> Result<()>;
}

/// Outcome of a usage report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReceipt {
    pub success: bool,
    pub remaining: Option<u64>,
}

/// Billing port: report consumed tokens after stream completion.
/// Failures are logged by the caller, never retried synchronously, and
/// never block the user flow.
#[async_trait]
pub trait UsageReporter: Send + Sync {
    async fn report_tokens_used(&self, total_tokens: u32) -> Result<UsageReceipt>;
}

/// Provider seam: opens a chat stream for a message list.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> lumen_ai::Result<ProviderEventStream>;
}

/// Transport backed by the HTTP chat client
pub struct HttpTransport {
    client: ChatClient,
}

impl HttpTransport {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            client: ChatClient::new(config),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> lumen_ai::Result<ProviderEventStream> {
        self.client.stream_chat(messages).await
    }
}
