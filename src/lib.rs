//! Toon-Leech: a resumable chapter harvester
//!
//! This crate follows chained publications (one chapter links to the next),
//! fetches every page of each chapter with bounded concurrency, and archives
//! each chapter as a single CBZ bundle exactly once. Progress is recorded in a
//! SQLite store so interrupted or repeated runs resume where they stopped.

pub mod archive;
pub mod chain;
pub mod config;
pub mod model;
pub mod output;
pub mod sources;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;

/// Main error type for harvesting operations
#[derive(Debug, Error)]
pub enum LeechError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Content unavailable for {series} {episode}: {reason}")]
    ContentUnavailable {
        series: String,
        episode: String,
        reason: String,
    },

    #[error("Invalid successor reference in {series} {episode}: {reference}")]
    InvalidReference {
        series: String,
        episode: String,
        reference: String,
    },

    #[error("Transport failure on {chapter}: {source}")]
    TransportFailure {
        chapter: String,
        /// Number of pages that failed; zero when the chapter document itself failed
        failed_pages: usize,
        source: transport::TransportError,
    },

    #[error("Harvest cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Archive error: {0}")]
    Archive(#[from] archive::ArchiveError),

    #[error("No source registered for domain {0}")]
    UnknownSource(String),

    #[error("Unknown series: {0}")]
    UnknownSeries(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LeechError {
    /// Returns true for conditions that end a series without failing the run
    pub fn is_soft_terminal(&self) -> bool {
        matches!(
            self,
            Self::ContentUnavailable { .. } | Self::InvalidReference { .. }
        )
    }

    /// Returns true if the run was cancelled by the caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid episode pattern: {0}")]
    InvalidPattern(String),
}

/// Result type alias for harvesting operations
pub type Result<T> = std::result::Result<T, LeechError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use chain::HarvestEngine;
pub use config::Config;
pub use output::{BatchReport, SeriesOutcome, SeriesReport};
pub use model::{EpisodeKey, Page};
