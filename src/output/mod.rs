//! Output module for harvest reports and library statistics
//!
//! This module handles:
//! - Per-series outcomes of a harvest run and the batch summary
//! - Library statistics read back from the progress store

mod report;
pub mod stats;

pub use report::{BatchReport, SeriesOutcome, SeriesReport};
pub use stats::{load_statistics, print_statistics, LibraryStatistics, SeriesStatistics};
