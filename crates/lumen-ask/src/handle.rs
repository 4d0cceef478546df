//! A cloneable handle for cancelling in-flight requests from external code.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable handle onto the orchestrator's cancellation state.
///
/// Exactly one live token exists at a time; admitting a new generation
/// invalidates the previous token before installing a fresh one. All fields
/// are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct AskHandle {
    cancel: Arc<Mutex<CancellationToken>>,
    /// Monotonic generation counter; bumped on admission and close
    generation: Arc<AtomicU64>,
    /// Generation currently driving a streaming loop, 0 when idle
    running: Arc<AtomicU64>,
    idle_notify: Arc<tokio::sync::Notify>,
}

impl AskHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            generation: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicU64::new(0)),
            idle_notify: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Cancel the current generation. Idempotent; safe with nothing in flight.
    pub fn cancel(&self, reason: &str) {
        let token = self.cancel.lock();
        if !token.is_cancelled() {
            tracing::debug!(reason, "cancelling in-flight request");
        }
        token.cancel();
    }

    /// Invalidate the previous generation and install a fresh token.
    /// Returns the new generation's token and number.
    pub(crate) fn begin_generation(&self, reason: &str) -> (CancellationToken, u64) {
        let mut guard = self.cancel.lock();
        if !guard.is_cancelled() {
            tracing::debug!(reason, "superseding in-flight request");
        }
        guard.cancel();
        *guard = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        (guard.clone(), generation)
    }

    /// Cancel and retire the current generation without starting a new one.
    /// A retired generation's completion no longer writes shared state.
    pub(crate) fn retire(&self, reason: &str) {
        let guard = self.cancel.lock();
        if !guard.is_cancelled() {
            tracing::debug!(reason, "retiring in-flight request");
        }
        guard.cancel();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// The generation number of the most recent admission
    pub(crate) fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, generation: u64) {
        self.running.store(generation, Ordering::Release);
    }

    pub(crate) fn mark_idle(&self, generation: u64) {
        // Only clear if a newer generation hasn't taken over.
        let _ = self.running.compare_exchange(
            generation,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.idle_notify.notify_waiters();
    }

    /// Whether a streaming loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) != 0
    }

    /// Wait until the orchestrator becomes idle.
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.idle_notify.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    /// Wait until idle, with a timeout. Returns `true` if idle was reached.
    pub async fn wait_for_idle_timeout(&self, timeout: std::time::Duration) -> bool {
        if !self.is_running() {
            return true;
        }
        tokio::time::timeout(timeout, self.wait_for_idle())
            .await
            .is_ok()
    }
}
