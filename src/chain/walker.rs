//! Sequential traversal of one series
//!
//! The walker starts at a chapter (the subscription root or the last stored
//! chapter), archives it unless it already exists, resolves its successor and
//! repeats until the chain ends, a soft-terminal condition is met, or a hard
//! failure propagates.

use crate::archive::{ArchiveWriter, PagePool, PoolError};
use crate::chain::{Chapter, Source, SourceError};
use crate::model::{EpisodeKey, Page, SeriesRecord};
use crate::storage::ProgressStore;
use crate::transport::TransportError;
use crate::{LeechError, Result};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Walker state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Idle,
    FetchingPages,
    Archived,
    Skipped,
    ResolvingNext,
    Advancing,
    Finished,
    SoftStopped,
}

/// Why a walk ended early without failing
#[derive(Debug, Clone, PartialEq)]
pub enum SoftStop {
    ContentUnavailable(String),
    InvalidReference(String),
    /// The successor does not sort after the current chapter
    NonAdvancing {
        current: EpisodeKey,
        next: EpisodeKey,
    },
}

impl fmt::Display for SoftStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentUnavailable(reason) => write!(f, "content unavailable: {}", reason),
            Self::InvalidReference(reference) => {
                write!(f, "invalid successor reference: {}", reference)
            }
            Self::NonAdvancing { current, next } => {
                write!(f, "successor {} does not follow {}", next, current)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WalkOutcome {
    /// The chain ended; the series is marked finished
    Finished,
    SoftStopped(SoftStop),
}

pub struct ChainWalker<'a> {
    series: &'a SeriesRecord,
    source: &'a dyn Source,
    store: &'a dyn ProgressStore,
    pool: &'a PagePool,
    cancel: &'a CancellationToken,
    state: WalkState,
    history: Vec<WalkState>,
    archived: Vec<EpisodeKey>,
    skipped: usize,
}

impl<'a> ChainWalker<'a> {
    pub fn new(
        series: &'a SeriesRecord,
        source: &'a dyn Source,
        store: &'a dyn ProgressStore,
        pool: &'a PagePool,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            series,
            source,
            store,
            pool,
            cancel,
            state: WalkState::Idle,
            history: vec![WalkState::Idle],
            archived: Vec::new(),
            skipped: 0,
        }
    }

    pub fn state(&self) -> WalkState {
        self.state
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[WalkState] {
        &self.history
    }

    /// Keys archived during this walk
    pub fn archived(&self) -> &[EpisodeKey] {
        &self.archived
    }

    /// Chapters skipped because they were archived already or had no pages
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Walks the chain from `start`
    ///
    /// # Returns
    ///
    /// * `Ok(WalkOutcome::Finished)` - The chain ended; the series is marked finished
    /// * `Ok(WalkOutcome::SoftStopped(_))` - Content was unavailable or the successor
    ///   reference was unusable; the series stays unfinished
    /// * `Err(LeechError)` - A hard failure or cancellation; the current chapter
    ///   left nothing at its archive path
    pub async fn walk(&mut self, start: Box<dyn Chapter>) -> Result<WalkOutcome> {
        match self.walk_chain(start).await {
            Err(LeechError::ContentUnavailable { reason, .. }) => {
                self.soft_stop(SoftStop::ContentUnavailable(reason), true)
            }
            Err(LeechError::InvalidReference { reference, .. }) => {
                self.soft_stop(SoftStop::InvalidReference(reference), true)
            }
            other => other,
        }
    }

    async fn walk_chain(&mut self, start: Box<dyn Chapter>) -> Result<WalkOutcome> {
        let mut current = start;

        loop {
            self.ensure_running()?;
            self.process(current.as_ref()).await?;

            self.transition(WalkState::ResolvingNext);
            let next = current
                .next(self.cancel)
                .await
                .map_err(|e| self.source_failure(current.as_ref(), e))?;
            self.ensure_running()?;

            let Some(next) = next else {
                self.store.mark_finished(&self.series.name, true)?;
                self.transition(WalkState::Finished);
                tracing::info!("{}: reached the end of the chain", self.series.name);
                return Ok(WalkOutcome::Finished);
            };

            if next.episode() <= current.episode() {
                let stop = SoftStop::NonAdvancing {
                    current: current.episode().clone(),
                    next: next.episode().clone(),
                };
                return self.soft_stop(stop, false);
            }

            let next = match self.store.get(&self.series.name, next.episode())? {
                Some(stored) => {
                    tracing::debug!(
                        "{}: reusing stored chapter {}",
                        self.series.name,
                        stored.episode
                    );
                    self.source.open(self.series, stored)
                }
                None => {
                    self.store.put(next.record())?;
                    next
                }
            };

            self.store
                .set_successor(&self.series.name, current.episode(), next.episode())?;
            self.transition(WalkState::Advancing);
            current = next;
        }
    }

    /// Archives one chapter unless it exists, then records it
    async fn process(&mut self, chapter: &dyn Chapter) -> Result<()> {
        self.transition(WalkState::FetchingPages);

        if chapter.exists() {
            tracing::debug!("{}: {} already archived", self.series.name, chapter.episode());
            self.skip();
        } else {
            let urls = chapter
                .pages(self.cancel)
                .await
                .map_err(|e| self.source_failure(chapter, e))?;

            if urls.is_empty() {
                tracing::info!("{}: no content in {}", self.series.name, chapter.episode());
                self.skip();
            } else {
                self.archive(chapter, Page::from_urls(urls)).await?;
            }
        }

        self.store.put(chapter.record())?;
        Ok(())
    }

    async fn archive(&mut self, chapter: &dyn Chapter, pages: Vec<Page>) -> Result<()> {
        let mut writer = ArchiveWriter::new();

        self.pool
            .run(chapter, &pages, &mut writer, self.cancel)
            .await
            .map_err(|e| self.pool_failure(chapter, e))?;

        if self.cancel.is_cancelled() {
            writer.discard();
            return Err(LeechError::Cancelled);
        }

        let path = chapter.archive_path();
        let size = writer.commit(&path)?;
        tracing::info!(
            "{}: archived {} ({} pages, {} bytes)",
            self.series.name,
            chapter.episode(),
            pages.len(),
            size
        );

        self.archived.push(chapter.episode().clone());
        self.transition(WalkState::Archived);
        Ok(())
    }

    fn skip(&mut self) {
        self.skipped += 1;
        self.transition(WalkState::Skipped);
    }

    fn soft_stop(&mut self, stop: SoftStop, mark_unfinished: bool) -> Result<WalkOutcome> {
        if mark_unfinished {
            self.store.mark_finished(&self.series.name, false)?;
        }
        self.transition(WalkState::SoftStopped);
        tracing::warn!("{}: stopped, {}", self.series.name, stop);
        Ok(WalkOutcome::SoftStopped(stop))
    }

    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LeechError::Cancelled);
        }
        Ok(())
    }

    fn transition(&mut self, state: WalkState) {
        self.state = state;
        self.history.push(state);
    }

    fn source_failure(&self, chapter: &dyn Chapter, error: SourceError) -> LeechError {
        match error {
            SourceError::ContentUnavailable(reason) => LeechError::ContentUnavailable {
                series: self.series.name.clone(),
                episode: chapter.episode().to_string(),
                reason,
            },
            SourceError::InvalidReference(reference) => LeechError::InvalidReference {
                series: self.series.name.clone(),
                episode: chapter.episode().to_string(),
                reference,
            },
            SourceError::Transport(TransportError::Cancelled) => LeechError::Cancelled,
            SourceError::Transport(source) => LeechError::TransportFailure {
                chapter: chapter_label(self.series, chapter),
                failed_pages: 0,
                source,
            },
        }
    }

    fn pool_failure(&self, chapter: &dyn Chapter, error: PoolError) -> LeechError {
        match error {
            PoolError::PartialPageFailure { failed, first, .. } => LeechError::TransportFailure {
                chapter: chapter_label(self.series, chapter),
                failed_pages: failed,
                source: first,
            },
            PoolError::Cancelled => LeechError::Cancelled,
            PoolError::Archive(e) => LeechError::Archive(e),
        }
    }
}

fn chapter_label(series: &SeriesRecord, chapter: &dyn Chapter) -> String {
    format!("{} {}", series.name, chapter.episode())
}
