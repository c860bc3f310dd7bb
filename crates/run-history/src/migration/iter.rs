//! Memory-bounded iteration over append-only storage.

use super::progress::MigrationProgress;
use super::MigrationOptions;
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::models::{PartitionBackfill, Run, RunRecord};
use crate::storage::RunStorage;

type FetchFn<'a, T> = Box<dyn FnMut(Option<&str>, usize) -> Result<Vec<T>> + 'a>;
type CountFn<'a> = Box<dyn FnOnce() -> Result<usize> + 'a>;

/// Lazily pages through a collection by last-seen identifier.
///
/// Each call to the fetch function receives the identifier of the last
/// record yielded, so pages are bounded by identifier rather than offset.
/// A page shorter than the chunk size ends the stream. Items are
/// `Result`s: the first error is yielded once and the iterator then ends.
///
/// Not restartable; build a new iterator to scan again.
pub struct ChunkedCursorIter<'a, T> {
    fetch: FetchFn<'a, T>,
    cursor_of: fn(&T) -> String,
    count: Option<CountFn<'a>>,
    progress: Option<&'a dyn MigrationProgress>,
    cancel: Option<&'a CancellationToken>,
    chunk_size: usize,
    cursor: Option<String>,
    chunk: std::vec::IntoIter<T>,
    chunk_len: usize,
    exhausted: bool,
}

impl<'a, T> ChunkedCursorIter<'a, T> {
    /// Page with `fetch(cursor, limit)`, taking each yielded record's
    /// identifier from `cursor_of`.
    pub fn new<F>(fetch: F, cursor_of: fn(&T) -> String, options: &MigrationOptions<'a>) -> Self
    where
        F: FnMut(Option<&str>, usize) -> Result<Vec<T>> + 'a,
    {
        Self {
            fetch: Box::new(fetch),
            cursor_of,
            count: None,
            progress: options.progress,
            cancel: options.cancel,
            chunk_size: options.chunk_size,
            cursor: None,
            chunk: Vec::new().into_iter(),
            chunk_len: 0,
            exhausted: options.chunk_size == 0,
        }
    }

    /// Total-count query reported to the progress receiver before the first
    /// fetch. Never issued when no receiver is attached.
    pub fn with_count<C>(mut self, count: C) -> Self
    where
        C: FnOnce() -> Result<usize> + 'a,
    {
        if self.progress.is_some() {
            self.count = Some(Box::new(count));
        }
        self
    }

    /// Identifier of the last record yielded.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    fn finish_chunk(&mut self) {
        if self.chunk_len > 0 {
            if let Some(progress) = self.progress {
                progress.advance(self.chunk_len);
            }
            self.chunk_len = 0;
        }
    }

    fn fetch_chunk(&mut self) -> Result<()> {
        if let Some(count) = self.count.take() {
            let total = count()?;
            if let Some(progress) = self.progress {
                progress.set_total(total);
            }
        }

        if let Some(cancel) = self.cancel {
            cancel.check()?;
        }

        let chunk = (self.fetch)(self.cursor.as_deref(), self.chunk_size)?;
        if chunk.len() < self.chunk_size {
            self.exhausted = true;
        }
        self.chunk_len = chunk.len();
        self.chunk = chunk.into_iter();
        Ok(())
    }
}

impl<T> Iterator for ChunkedCursorIter<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.chunk.next() {
                self.cursor = Some((self.cursor_of)(&item));
                return Some(Ok(item));
            }

            self.finish_chunk();
            if self.exhausted {
                return None;
            }

            if let Err(err) = self.fetch_chunk() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
    }
}

/// Every run, newest first.
pub fn chunked_run_iterator<'a>(
    storage: &'a dyn RunStorage,
    options: &MigrationOptions<'a>,
) -> ChunkedCursorIter<'a, Run> {
    ChunkedCursorIter::new(
        move |cursor: Option<&str>, limit: usize| storage.get_runs(cursor, limit),
        |run: &Run| run.run_id.clone(),
        options,
    )
    .with_count(move || storage.get_runs_count())
}

/// Every run with its storage metadata, newest first.
pub fn chunked_run_records_iterator<'a>(
    storage: &'a dyn RunStorage,
    options: &MigrationOptions<'a>,
) -> ChunkedCursorIter<'a, RunRecord> {
    ChunkedCursorIter::new(
        move |cursor: Option<&str>, limit: usize| storage.get_run_records(cursor, limit),
        |record: &RunRecord| record.run.run_id.clone(),
        options,
    )
    .with_count(move || storage.get_runs_count())
}

/// Every backfill, newest first.
pub fn chunked_backfill_iterator<'a>(
    storage: &'a dyn RunStorage,
    options: &MigrationOptions<'a>,
) -> ChunkedCursorIter<'a, PartitionBackfill> {
    ChunkedCursorIter::new(
        move |cursor: Option<&str>, limit: usize| storage.get_backfills(cursor, limit),
        |backfill: &PartitionBackfill| backfill.backfill_id.clone(),
        options,
    )
    .with_count(move || storage.get_backfills_count())
}
