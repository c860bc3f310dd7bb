//! Stopping a data migration between chunks.
//!
//! The chunked iterator consults the token before every page fetch and the
//! runner consults it before every migration. A stop request therefore lands
//! on a chunk boundary: rows already written stay written, and the migration
//! is left unmarked so the next run resumes it.

use crate::error::RunHistoryError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stop flag shared between the code driving a migration and the migration
/// itself. Clones observe the same flag.
///
/// ```
/// use run_history::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let operator = token.clone();
/// operator.cancel();
/// assert!(token.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    stop_requested: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running migration to stop at its next chunk boundary.
    pub fn cancel(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// `Err` once a stop has been requested.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            return Err(CancelledError);
        }
        Ok(())
    }
}

/// A migration stopped at a chunk boundary on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl fmt::Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("data migration stopped at a chunk boundary")
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for RunHistoryError {
    fn from(_: CancelledError) -> Self {
        RunHistoryError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_untouched_token_lets_migration_continue() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.check(), Ok(()));
    }

    #[test]
    fn test_stop_requested_from_another_thread() {
        let token = CancellationToken::new();
        let operator = token.clone();

        thread::spawn(move || operator.cancel()).join().unwrap();

        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(CancelledError));
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_stop_surfaces_as_cancelled_migration() {
        let err: RunHistoryError = CancelledError.into();
        assert!(matches!(err, RunHistoryError::Cancelled));
    }
}
