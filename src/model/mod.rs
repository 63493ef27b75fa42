//! Data model shared by the harvesting engine
//!
//! # Components
//!
//! - `EpisodeKey`: totally ordered chapter identity within a series
//! - `Page`: one page of a chapter and its archive entry name
//! - `SeriesRecord` / `ChapterRecord`: what the progress store persists
//! - `archive_path`: where a chapter's archive lives on disk

mod episode_key;
mod page;
mod series;

pub use episode_key::EpisodeKey;
pub use page::Page;
pub use series::{archive_path, series_dir, ChapterRecord, SeriesRecord, ARCHIVE_EXTENSION};
