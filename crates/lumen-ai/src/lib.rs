//! lumen-ai: chat provider layer
//!
//! Wire types for the OpenAI-compatible chat-completion call, the SSE
//! decoder for its streamed response body, and the HTTP client that ties
//! them together.

pub mod error;
pub mod provider;
pub mod sse;
pub mod types;

pub use error::{Error, Result};
pub use provider::ChatClient;
pub use sse::{ProviderEvent, ProviderEventStream, SseDecoder, decode_stream};
pub use types::*;
