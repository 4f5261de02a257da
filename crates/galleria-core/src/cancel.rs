//! Cooperative cancellation for long-running passes.
//!
//! Migration and cleanup check the token only between artifact groups, never
//! in the middle of one, so a cancelled run always stops on a group boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag.
///
/// # Example
///
/// ```
/// use galleria_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handler_side = token.clone();
///
/// handler_side.cancel();
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

    /// Return an error if cancellation has been requested.
    ///
    /// Call this before starting the next artifact group.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

/// Error returned when an operation is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation was cancelled")
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for crate::error::GalleriaError {
    fn from(_: CancelledError) -> Self {
        crate::error::GalleriaError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GalleriaError;

    #[test]
    fn test_new_token_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_clone_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();

        clone.cancel();

        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(CancelledError));
    }

    #[test]
    fn test_converts_to_engine_error() {
        let err: GalleriaError = CancelledError.into();
        assert!(matches!(err, GalleriaError::Cancelled));
    }
}
