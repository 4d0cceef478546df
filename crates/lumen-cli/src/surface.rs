//! Terminal stand-in for the desktop ask surface

use lumen_ask::Surface;

/// A surface that is always available; visibility requests are only logged.
pub struct TerminalSurface;

impl Surface for TerminalSurface {
    fn is_available(&self) -> bool {
        true
    }

    fn request_visibility(&self, visible: bool) {
        tracing::debug!(visible, "surface visibility requested");
    }
}
