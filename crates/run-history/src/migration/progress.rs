//! Progress reporting for data migrations.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Receives progress from a running migration.
///
/// A migration calls [`set_total`](MigrationProgress::set_total) once, when
/// its total-count query returns, then [`advance`](MigrationProgress::advance)
/// after each chunk with that chunk's length.
pub trait MigrationProgress: Send + Sync {
    /// Free-form status line, e.g. the migration being started.
    fn message(&self, _message: &str) {}

    fn set_total(&self, total: usize);

    fn advance(&self, count: usize);
}

/// Snapshot of a [`ProgressTracker`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: Option<usize>,
    pub processed: usize,
    /// Number of `advance` calls, one per consumed chunk.
    pub updates: usize,
    pub messages: Vec<String>,
}

/// In-memory progress state, readable from another thread while a
/// migration runs.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<ProgressSnapshot>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressSnapshot> {
        // The state is plain counters; a panic mid-update cannot leave it
        // inconsistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().clone()
    }
}

impl MigrationProgress for ProgressTracker {
    fn message(&self, message: &str) {
        self.lock().messages.push(message.to_string());
    }

    fn set_total(&self, total: usize) {
        self.lock().total = Some(total);
    }

    fn advance(&self, count: usize) {
        let mut state = self.lock();
        state.processed += count;
        state.updates += 1;
    }
}

/// Reports progress as `tracing` events.
#[derive(Debug, Default)]
pub struct LogProgress {
    state: Mutex<(Option<usize>, usize)>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MigrationProgress for LogProgress {
    fn message(&self, message: &str) {
        info!("{}", message);
    }

    fn set_total(&self, total: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = (Some(total), 0);
        info!("Migrating {} records", total);
    }

    fn advance(&self, count: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.1 += count;
        match state.0 {
            Some(total) => info!("Migrated {}/{} records", state.1, total),
            None => info!("Migrated {} records", state.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_accumulates_chunks() {
        let tracker = ProgressTracker::new();
        tracker.message("Adding partition tags");
        tracker.set_total(250);
        tracker.advance(100);
        tracker.advance(100);
        tracker.advance(50);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total, Some(250));
        assert_eq!(snapshot.processed, 250);
        assert_eq!(snapshot.updates, 3);
        assert_eq!(snapshot.messages, vec!["Adding partition tags".to_string()]);
    }

    #[test]
    fn test_advance_without_total() {
        let tracker = ProgressTracker::new();
        tracker.advance(10);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total, None);
        assert_eq!(snapshot.processed, 10);
        assert_eq!(snapshot.updates, 1);
    }

    #[test]
    fn test_log_progress_counts() {
        let progress = LogProgress::new();
        progress.set_total(3);
        progress.advance(2);
        progress.advance(1);
        let state = progress.state.lock().unwrap();
        assert_eq!(*state, (Some(3), 3));
    }
}
