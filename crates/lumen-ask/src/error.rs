//! Error types for lumen-ask

use thiserror::Error;

/// Result type alias using lumen-ask Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating an ask request
#[derive(Error, Debug)]
pub enum Error {
    /// Caller is not authenticated; checked before any other work
    #[error("Authentication required. Please log in through settings.")]
    AuthRequired,

    /// No model or API key is configured
    #[error("AI model or API key not configured.")]
    ModelNotConfigured,

    /// The presentation surface vanished before or during streaming
    #[error("Ask surface is not available.")]
    SurfaceUnavailable,

    /// The provider rejected multimodal input; recoverable, consumed
    /// internally by the single text-only retry and never surfaced.
    #[error("Multimodal input rejected: {0}")]
    MultimodalRejected(String),

    /// Any other provider failure, after fallback exhaustion
    #[error("{0}")]
    Provider(String),

    /// A message could not be persisted; logged, never surfaced
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Token usage could not be reported; logged, never surfaced
    #[error("Usage report error: {0}")]
    UsageReport(String),
}
