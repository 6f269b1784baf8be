//! Cooperative cancellation for batch runs.
//!
//! Batch jobs check the token between items, never in the middle of one, so a
//! cancelled run never leaves an item half-written on account of the
//! cancellation itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::DsapsError;

/// A cancellation token shared between a batch job and whoever may stop it.
///
/// # Example
///
/// ```
/// use dsaps_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
///
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(DsapsError::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), DsapsError> {
        if self.is_cancelled() {
            Err(DsapsError::Cancelled)
        } else {
            Ok(())
        }
    }
}
