//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ProgressStore trait.

use crate::model::{ChapterRecord, EpisodeKey, SeriesRecord};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ProgressStore, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite progress store
///
/// The connection sits behind a mutex so the store can be shared between
/// concurrently running series walkers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }
}

const SERIES_COLUMNS: &str =
    "name, domain, lang, start_url, start_episode, finished, created_at, updated_at";

const CHAPTER_COLUMNS: &str = "series, episode_key, name, url, next_key";

/// Raw `series` row before its episode key is decoded
struct SeriesRow {
    name: String,
    domain: String,
    lang: String,
    start_url: String,
    start_episode: String,
    finished: bool,
    created_at: String,
    updated_at: Option<String>,
}

impl SeriesRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            domain: row.get(1)?,
            lang: row.get(2)?,
            start_url: row.get(3)?,
            start_episode: row.get(4)?,
            finished: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_record(self) -> StorageResult<SeriesRecord> {
        Ok(SeriesRecord {
            start_episode: decode_key(&self.start_episode)?,
            name: self.name,
            domain: self.domain,
            lang: self.lang,
            start_url: self.start_url,
            finished: self.finished,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Raw `chapters` row before its episode keys are decoded
struct ChapterRow {
    series: String,
    episode_key: String,
    name: String,
    url: String,
    next_key: Option<String>,
}

impl ChapterRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            series: row.get(0)?,
            episode_key: row.get(1)?,
            name: row.get(2)?,
            url: row.get(3)?,
            next_key: row.get(4)?,
        })
    }

    fn into_record(self) -> StorageResult<ChapterRecord> {
        let next = match &self.next_key {
            Some(raw) => Some(decode_key(raw)?),
            None => None,
        };
        Ok(ChapterRecord {
            episode: decode_key(&self.episode_key)?,
            series: self.series,
            name: self.name,
            url: self.url,
            next,
        })
    }
}

fn decode_key(raw: &str) -> StorageResult<EpisodeKey> {
    EpisodeKey::from_db_string(raw).ok_or_else(|| StorageError::InvalidKey(raw.to_string()))
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl SqliteStore {
    fn query_series(&self, filter: &str) -> StorageResult<Vec<SeriesRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM series {} ORDER BY name",
            SERIES_COLUMNS, filter
        ))?;
        let rows = stmt
            .query_map([], SeriesRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SeriesRow::into_record).collect()
    }
}

impl ProgressStore for SqliteStore {
    // ===== Series =====

    fn register_series(&self, series: &SeriesRecord) -> StorageResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO series (name, domain, lang, start_url, start_episode, finished, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(name) DO NOTHING",
            params![
                series.name,
                series.domain,
                series.lang,
                series.start_url,
                series.start_episode.to_db_string(),
                series.finished,
                series.created_at,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn get_series(&self, name: &str) -> StorageResult<Option<SeriesRecord>> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                &format!("SELECT {} FROM series WHERE name = ?1", SERIES_COLUMNS),
                params![name],
                SeriesRow::from_row,
            )
            .optional()?
        };
        row.map(SeriesRow::into_record).transpose()
    }

    fn list_series(&self) -> StorageResult<Vec<SeriesRecord>> {
        self.query_series("")
    }

    fn unfinished_series(&self) -> StorageResult<Vec<SeriesRecord>> {
        self.query_series("WHERE finished = 0")
    }

    fn mark_finished(&self, name: &str, finished: bool) -> StorageResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE series SET finished = ?1, updated_at = ?2 WHERE name = ?3",
            params![finished, Utc::now().to_rfc3339(), name],
        )?;
        if updated == 0 {
            return Err(StorageError::SeriesNotFound(name.to_string()));
        }
        Ok(())
    }

    fn rename_series(&self, old: &str, new: &str) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let taken: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM series WHERE name = ?1)",
            params![new],
            |row| row.get(0),
        )?;
        if taken {
            return Err(StorageError::ConstraintViolation(format!(
                "series '{}' already exists",
                new
            )));
        }

        let updated = tx.execute(
            "UPDATE series SET name = ?1, updated_at = ?2 WHERE name = ?3",
            params![new, Utc::now().to_rfc3339(), old],
        )?;
        if updated == 0 {
            return Err(StorageError::SeriesNotFound(old.to_string()));
        }

        tx.execute(
            "UPDATE chapters SET series = ?1 WHERE series = ?2",
            params![new, old],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn distinct_series_names(&self) -> StorageResult<BTreeSet<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT name FROM series UNION SELECT DISTINCT series FROM chapters")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(names)
    }

    // ===== Chapters =====

    fn exists(&self, series: &str, episode: &EpisodeKey) -> StorageResult<bool> {
        let conn = self.conn()?;
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM chapters WHERE series = ?1 AND episode_key = ?2)",
            params![series, episode.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn get(&self, series: &str, episode: &EpisodeKey) -> StorageResult<Option<ChapterRecord>> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                &format!(
                    "SELECT {} FROM chapters WHERE series = ?1 AND episode_key = ?2",
                    CHAPTER_COLUMNS
                ),
                params![series, episode.to_db_string()],
                ChapterRow::from_row,
            )
            .optional()?
        };
        row.map(ChapterRow::into_record).transpose()
    }

    fn put(&self, chapter: &ChapterRecord) -> StorageResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO chapters (series, episode_key, name, url, next_key, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(series, episode_key) DO NOTHING",
            params![
                chapter.series,
                chapter.episode.to_db_string(),
                chapter.name,
                chapter.url,
                chapter.next.as_ref().map(EpisodeKey::to_db_string),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn set_successor(
        &self,
        series: &str,
        episode: &EpisodeKey,
        next: &EpisodeKey,
    ) -> StorageResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE chapters SET next_key = ?1 WHERE series = ?2 AND episode_key = ?3",
            params![next.to_db_string(), series, episode.to_db_string()],
        )?;
        if updated == 0 {
            return Err(StorageError::ConstraintViolation(format!(
                "successor set on unknown chapter {} {}",
                series, episode
            )));
        }
        Ok(())
    }

    fn latest(&self, series: &str) -> StorageResult<Option<ChapterRecord>> {
        // Keys order by EpisodeKey rules, which SQL text ordering cannot express
        Ok(self.chapters(series)?.pop())
    }

    fn chapters(&self, series: &str) -> StorageResult<Vec<ChapterRecord>> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chapters WHERE series = ?1",
                CHAPTER_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![series], ChapterRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut chapters = rows
            .into_iter()
            .map(ChapterRow::into_record)
            .collect::<StorageResult<Vec<_>>>()?;
        chapters.sort_by(|a, b| a.episode.cmp(&b.episode));
        Ok(chapters)
    }

    // ===== Run Management =====

    fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
            params![run_id],
            row_to_run,
        )
        .optional()?
        .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }
}
