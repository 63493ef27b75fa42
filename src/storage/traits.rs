//! Storage traits and error types
//!
//! This module defines the trait interface for progress stores and
//! associated error types.

use crate::model::{ChapterRecord, EpisodeKey, SeriesRecord};
use crate::storage::{RunRecord, RunStatus};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt episode key in store: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistent record of harvesting progress
///
/// Every method takes `&self`: one store is shared by all concurrent series
/// walkers, so implementations serialise access internally. Chapter insertion
/// is idempotent; re-inserting a known `(series, episode)` is a no-op.
pub trait ProgressStore: Send + Sync {
    // ===== Series =====

    /// Registers a subscription if it is not known yet
    ///
    /// An existing row is left untouched, so the stored `finished` flag always
    /// wins over the configuration.
    ///
    /// # Returns
    ///
    /// `true` if the series was inserted
    fn register_series(&self, series: &SeriesRecord) -> StorageResult<bool>;

    fn get_series(&self, name: &str) -> StorageResult<Option<SeriesRecord>>;

    /// Every series, ordered by name
    fn list_series(&self) -> StorageResult<Vec<SeriesRecord>>;

    /// Series with `finished == false`, ordered by name
    fn unfinished_series(&self) -> StorageResult<Vec<SeriesRecord>>;

    /// Sets the terminal flag of a series
    fn mark_finished(&self, name: &str, finished: bool) -> StorageResult<()>;

    /// Renames a series and moves its chapters along
    fn rename_series(&self, old: &str, new: &str) -> StorageResult<()>;

    /// Names of every series with at least one stored chapter or subscription
    fn distinct_series_names(&self) -> StorageResult<BTreeSet<String>>;

    // ===== Chapters =====

    fn exists(&self, series: &str, episode: &EpisodeKey) -> StorageResult<bool>;

    fn get(&self, series: &str, episode: &EpisodeKey) -> StorageResult<Option<ChapterRecord>>;

    /// Inserts a chapter if its identity is not stored yet
    ///
    /// # Returns
    ///
    /// `true` if the chapter was inserted, `false` if it already existed
    fn put(&self, chapter: &ChapterRecord) -> StorageResult<bool>;

    /// Records the successor pointer of a stored chapter
    fn set_successor(
        &self,
        series: &str,
        episode: &EpisodeKey,
        next: &EpisodeKey,
    ) -> StorageResult<()>;

    /// The stored chapter with the highest episode key
    fn latest(&self, series: &str) -> StorageResult<Option<ChapterRecord>>;

    /// Every stored chapter of a series in episode order
    fn chapters(&self, series: &str) -> StorageResult<Vec<ChapterRecord>>;

    // ===== Run Management =====

    /// Creates a new harvest run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&self, config_hash: &str) -> StorageResult<i64>;

    /// Sets the final status of a run and stamps its finish time
    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;
}
