//! Cancellation token shared between a caller and a running pipeline.

use crate::errors::PipelineError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

/// A cloneable token for cooperative cancellation.
///
/// Clones observe the same state. Cancellation is idempotent and only the
/// first reason is kept.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .state
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.state.reason.write() = Some(reason.into());
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state.reason.read().clone()
    }

    /// Fails with [`PipelineError::Cancelled`] if cancellation was requested.
    ///
    /// `checkpoint` names where the run stopped and ends up in the error.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Cancelled` once the token is cancelled.
    pub fn check(&self, checkpoint: &str) -> Result<(), PipelineError> {
        if !self.is_cancelled() {
            return Ok(());
        }
        let reason = self.reason().unwrap_or_else(|| "cancelled".to_string());
        Err(PipelineError::Cancelled(format!("{reason} (before {checkpoint})")))
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
