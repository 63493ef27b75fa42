//! Bounded-concurrency page fetcher
//!
//! The pool downloads every page of one chapter with at most `k` requests in
//! flight and hands each body to the [`ArchiveWriter`] as it lands. A failing
//! page does not stop its siblings; failures are tallied once every fetch has
//! resolved, and any failure discards the whole archive.

use crate::archive::{ArchiveError, ArchiveWriter};
use crate::chain::Chapter;
use crate::model::Page;
use crate::transport::{RetryPolicy, Transport, TransportError};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("{failed} of {total} pages failed, first error: {first}")]
    PartialPageFailure {
        failed: usize,
        total: usize,
        first: TransportError,
    },

    #[error("page fetch cancelled")]
    Cancelled,

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// One page landed in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageProgress {
    pub chapter: String,
    pub filename: String,
    pub completed: usize,
    pub total: usize,
}

pub type ProgressCallback = Arc<dyn Fn(&PageProgress) + Send + Sync>;

#[derive(Clone)]
pub struct PagePool {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    concurrency: usize,
    on_page: Option<ProgressCallback>,
}

impl fmt::Debug for PagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagePool")
            .field("retry", &self.retry)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl PagePool {
    /// Creates a pool; a concurrency of zero is raised to one
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy, concurrency: usize) -> Self {
        Self {
            transport,
            retry,
            concurrency: concurrency.max(1),
            on_page: None,
        }
    }

    /// Registers a callback invoked after every page written
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_page = Some(callback);
        self
    }

    /// Fetches `pages` into `writer`
    ///
    /// # Arguments
    ///
    /// * `chapter` - Supplies the auth context and validates page bodies
    /// * `pages` - Pages to fetch, addressed by their generated filenames
    /// * `writer` - Open writer receiving the bodies
    /// * `cancel` - Abandons in-flight fetches when fired
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Every page was written; the count of pages
    /// * `Err(PoolError)` - At least one page failed or the run was cancelled;
    ///   the writer has been discarded
    pub async fn run(
        &self,
        chapter: &dyn Chapter,
        pages: &[Page],
        writer: &mut ArchiveWriter,
        cancel: &CancellationToken,
    ) -> Result<usize, PoolError> {
        let result = self.fetch_all(chapter, pages, writer, cancel).await;
        if result.is_err() {
            writer.discard();
        }
        result
    }

    async fn fetch_all(
        &self,
        chapter: &dyn Chapter,
        pages: &[Page],
        writer: &mut ArchiveWriter,
        cancel: &CancellationToken,
    ) -> Result<usize, PoolError> {
        let total = pages.len();
        let label = chapter.record().url.clone();
        let auth = chapter.auth();
        let transport = self.transport.as_ref();
        let retry = &self.retry;

        let mut fetches = stream::iter(pages)
            .map(|page| async move {
                let result = retry
                    .fetch(transport, &page.url, auth, cancel)
                    .await
                    .and_then(|bytes| match chapter.check_page(&bytes) {
                        Ok(()) => Ok(bytes),
                        Err(reason) => Err(TransportError::InvalidPayload {
                            url: page.url.clone(),
                            reason,
                        }),
                    });
                (page, result)
            })
            .buffer_unordered(self.concurrency);

        let mut completed = 0;
        let mut failures: Vec<(usize, TransportError)> = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PoolError::Cancelled),
                next = fetches.next() => next,
            };
            let Some((page, result)) = next else {
                break;
            };

            match result {
                Ok(bytes) => {
                    writer.write(&page.filename, bytes)?;
                    completed += 1;
                    tracing::debug!("{} page {}/{} ({})", label, completed, total, page.filename);
                    if let Some(callback) = &self.on_page {
                        callback(&PageProgress {
                            chapter: label.clone(),
                            filename: page.filename.clone(),
                            completed,
                            total,
                        });
                    }
                }
                Err(TransportError::Cancelled) => return Err(PoolError::Cancelled),
                Err(error) => {
                    tracing::debug!("{} page {} failed: {}", label, page.filename, error);
                    failures.push((page.index, error));
                }
            }
        }

        if failures.is_empty() {
            return Ok(completed);
        }

        // "first" means lowest page index, not first to fail
        failures.sort_by_key(|(index, _)| *index);
        let failed = failures.len();
        let (_, first) = failures.swap_remove(0);
        Err(PoolError::PartialPageFailure {
            failed,
            total,
            first,
        })
    }
}
