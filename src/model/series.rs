use crate::model::EpisodeKey;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Archive file extension (zip of page images)
pub const ARCHIVE_EXTENSION: &str = "cbz";

/// A subscribed series as persisted in the progress store
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRecord {
    /// Series name, also the directory name under the library root
    pub name: String,

    /// Source domain used to look up the adapter
    pub domain: String,

    /// Language tag (e.g. "en", "fr")
    pub lang: String,

    /// Document URL of the first chapter to harvest
    pub start_url: String,

    /// Episode key of the first chapter to harvest
    pub start_episode: EpisodeKey,

    /// True once traversal reached the end of the chain
    pub finished: bool,

    pub created_at: String,
    pub updated_at: Option<String>,
}

impl SeriesRecord {
    /// Creates a new, unfinished series subscription
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        lang: impl Into<String>,
        start_url: impl Into<String>,
        start_episode: EpisodeKey,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            lang: lang.into(),
            start_url: start_url.into(),
            start_episode,
            finished: false,
            created_at: Utc::now().to_rfc3339(),
            updated_at: None,
        }
    }

    /// Returns the record of the subscription's first chapter
    pub fn root_chapter(&self) -> ChapterRecord {
        ChapterRecord::new(
            &self.name,
            self.start_episode.clone(),
            format!("{} {}", self.name, self.start_episode),
            &self.start_url,
        )
    }
}

/// A discovered chapter as persisted in the progress store
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRecord {
    /// Owning series name
    pub series: String,

    /// Episode key, unique within the series
    pub episode: EpisodeKey,

    /// Display name
    pub name: String,

    /// Document URL the adapter reads pages and successor from
    pub url: String,

    /// Successor pointer, once resolved
    pub next: Option<EpisodeKey>,
}

impl ChapterRecord {
    pub fn new(
        series: impl Into<String>,
        episode: EpisodeKey,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            series: series.into(),
            episode,
            name: name.into(),
            url: url.into(),
            next: None,
        }
    }
}

/// Directory holding every archive of a series
pub fn series_dir(library_root: &Path, series: &str) -> PathBuf {
    library_root.join(series)
}

/// Final archive location of one chapter
///
/// This is a pure function of the series name and the episode key; two
/// distinct keys always map to distinct paths because keys are normalised on
/// construction.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use toon_leech::model::{archive_path, EpisodeKey};
///
/// let path = archive_path(Path::new("/srv/toons"), "alpha", &EpisodeKey::Integer(3));
/// assert_eq!(path, Path::new("/srv/toons/alpha/3.cbz"));
/// ```
pub fn archive_path(library_root: &Path, series: &str, episode: &EpisodeKey) -> PathBuf {
    series_dir(library_root, series).join(format!("{}.{}", episode.file_stem(), ARCHIVE_EXTENSION))
}
