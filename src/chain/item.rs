//! Adapter capability contract
//!
//! A `Source` knows one website. It reconstructs `Chapter`s from stored
//! records, and each `Chapter` answers three questions for the walker: is it
//! archived already, which pages does it contain, and what comes next.

use crate::model::{ChapterRecord, EpisodeKey, SeriesRecord};
use crate::transport::{AuthContext, TransportError};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised by adapters while reading chapter documents
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The chapter (or its successor) is not published or was removed
    #[error("content unavailable: {0}")]
    ContentUnavailable(String),

    /// The successor link exists but cannot be turned into a chapter
    #[error("invalid successor reference: {0}")]
    InvalidReference(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One chapter as seen by the walker
#[async_trait]
pub trait Chapter: Send + Sync {
    /// What the progress store persists for this chapter
    fn record(&self) -> &ChapterRecord;

    /// Final archive location, a pure function of series and episode key
    fn archive_path(&self) -> PathBuf;

    /// Request decoration handed to the transport for page fetches
    fn auth(&self) -> &AuthContext;

    fn series(&self) -> &str {
        &self.record().series
    }

    fn episode(&self) -> &EpisodeKey {
        &self.record().episode
    }

    /// True when the archive is already on disk
    fn exists(&self) -> bool {
        self.archive_path().is_file()
    }

    /// Validates one fetched page body before it is archived
    fn check_page(&self, _bytes: &[u8]) -> Result<(), String> {
        Ok(())
    }

    /// Page URLs in reading order; empty means nothing to archive
    async fn pages(&self, cancel: &CancellationToken) -> Result<Vec<String>, SourceError>;

    /// The successor chapter, or `None` at the end of the chain
    async fn next(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn Chapter>>, SourceError>;
}

/// A website adapter
pub trait Source: Send + Sync {
    /// Host name this adapter serves
    fn domain(&self) -> &str;

    /// Rebuilds a chapter of `series` from its stored record
    fn open(&self, series: &SeriesRecord, record: ChapterRecord) -> Box<dyn Chapter>;
}
