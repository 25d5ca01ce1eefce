//! Cancellation tokens for index update iterations.
//!
//! The scan phase polls its token between filesystem operations and aborts
//! scope traversal promptly when cancelled. Directories not yet scanned in a
//! cancelled iteration simply remain queued for the next one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation token shared between a controller thread and the
/// thread running an index update.
///
/// Cancellation is one-way: once cancelled, a token stays cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a new, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is never cancelled.
    ///
    /// Useful for tests or update calls that should not be interruptible.
    pub fn noop() -> Self {
        Self::new()
    }

    /// Requests cancellation. All clones of this token observe the request.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns true if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
