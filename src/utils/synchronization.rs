//! Synchronization utilities for multi-threaded decompilation.
//!
//! # Key Components
//!
//! - [`CancellationToken`] - A shared flag that lets a caller abandon in-flight method runs
//!
//! # Design Principles
//!
//! - **Cooperative**: Analyses poll the token at iteration boundaries and stop with
//!   [`crate::Error::Cancelled`], so no analysis is interrupted halfway through an update
//! - **Cheap**: Polling is a single relaxed-acquire atomic load

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{Error, Result};

/// A cloneable handle to a shared cancellation flag.
///
/// Every clone observes the same flag. Cancelling is permanent for the token; start a new
/// token for a new run.
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::utils::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.checkpoint().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every run observing this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cooperative cancellation point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(clone.checkpoint().is_ok());

        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.checkpoint(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_cancel_across_threads() {
        let token = CancellationToken::new();
        let worker = token.clone();
        std::thread::spawn(move || worker.cancel())
            .join()
            .unwrap();
        assert!(token.is_cancelled());
    }
}
