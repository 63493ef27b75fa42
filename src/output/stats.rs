//! Statistics generation from the progress database
//!
//! This module provides functionality for extracting and displaying
//! library statistics from the storage layer.

use crate::model::{archive_path, EpisodeKey};
use crate::storage::{ProgressStore, RunRecord};
use crate::Result;
use std::path::Path;

/// Per-series statistics
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStatistics {
    pub name: String,
    pub domain: String,
    pub lang: String,
    pub finished: bool,

    /// Chapters recorded in the store
    pub known_chapters: usize,

    /// Recorded chapters whose archive is on disk
    pub archived_chapters: usize,

    /// Highest recorded episode key
    pub latest: Option<EpisodeKey>,
}

/// Library statistics summary
#[derive(Debug, Clone)]
pub struct LibraryStatistics {
    pub series: Vec<SeriesStatistics>,
    pub latest_run: Option<RunRecord>,
}

impl LibraryStatistics {
    pub fn total_chapters(&self) -> usize {
        self.series.iter().map(|s| s.known_chapters).sum()
    }

    pub fn total_archived(&self) -> usize {
        self.series.iter().map(|s| s.archived_chapters).sum()
    }

    pub fn finished_series(&self) -> usize {
        self.series.iter().filter(|s| s.finished).count()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The progress store to query
/// * `library_root` - Root directory of the archives, checked for each chapter
///
/// # Returns
///
/// * `Ok(LibraryStatistics)` - Successfully loaded statistics
/// * `Err(LeechError)` - Failed to query statistics
pub fn load_statistics(store: &dyn ProgressStore, library_root: &Path) -> Result<LibraryStatistics> {
    let mut series = Vec::new();

    for record in store.list_series()? {
        let chapters = store.chapters(&record.name)?;
        let archived_chapters = chapters
            .iter()
            .filter(|c| archive_path(library_root, &c.series, &c.episode).is_file())
            .count();

        series.push(SeriesStatistics {
            known_chapters: chapters.len(),
            archived_chapters,
            latest: chapters.last().map(|c| c.episode.clone()),
            name: record.name,
            domain: record.domain,
            lang: record.lang,
            finished: record.finished,
        });
    }

    Ok(LibraryStatistics {
        series,
        latest_run: store.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a human-readable format
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &LibraryStatistics) {
    println!("=== Library Statistics ===\n");

    println!("Overview:");
    println!(
        "  Series: {} ({} finished)",
        stats.series.len(),
        stats.finished_series()
    );
    println!("  Chapters recorded: {}", stats.total_chapters());
    println!("  Chapters archived: {}", stats.total_archived());
    println!();

    if !stats.series.is_empty() {
        println!("Series:");
        for series in &stats.series {
            let latest = series
                .latest
                .as_ref()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {} [{}, {}] {}/{} archived, latest {}{}",
                series.name,
                series.domain,
                series.lang,
                series.archived_chapters,
                series.known_chapters,
                latest,
                if series.finished { ", finished" } else { "" }
            );
        }
        println!();
    }

    if let Some(run) = &stats.latest_run {
        println!(
            "Last run: #{} started {} ({})",
            run.id,
            run.started_at,
            run.status.to_db_string()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChapterRecord, SeriesRecord};
    use crate::storage::SqliteStore;
    use tempfile::TempDir;

    #[test]
    fn test_load_statistics_counts_archives_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .register_series(&SeriesRecord::new(
                "alpha",
                "scans.example",
                "fr",
                "https://scans.example/alpha/1",
                EpisodeKey::Integer(1),
            ))
            .unwrap();
        for n in 1..=3 {
            store
                .put(&ChapterRecord::new(
                    "alpha",
                    EpisodeKey::Integer(n),
                    format!("alpha {}", n),
                    format!("https://scans.example/alpha/{}", n),
                ))
                .unwrap();
        }
        let path = archive_path(dir.path(), "alpha", &EpisodeKey::Integer(2));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"zip").unwrap();
        store.create_run("hash").unwrap();

        let stats = load_statistics(&store, dir.path()).unwrap();

        assert_eq!(stats.series.len(), 1);
        let alpha = &stats.series[0];
        assert_eq!(alpha.known_chapters, 3);
        assert_eq!(alpha.archived_chapters, 1);
        assert_eq!(alpha.latest, Some(EpisodeKey::Integer(3)));
        assert_eq!(stats.total_archived(), 1);
        assert_eq!(stats.finished_series(), 0);
        assert!(stats.latest_run.is_some());
    }
}
