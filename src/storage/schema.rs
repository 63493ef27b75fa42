//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Toon-Leech progress database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Subscribed series
CREATE TABLE IF NOT EXISTS series (
    name TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    lang TEXT NOT NULL,
    start_url TEXT NOT NULL,
    start_episode TEXT NOT NULL,
    finished INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT
);

-- Discovered chapters; episode_key holds the tagged key (i:12, d:12.5, s:slug)
CREATE TABLE IF NOT EXISTS chapters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    series TEXT NOT NULL,
    episode_key TEXT NOT NULL,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    next_key TEXT,
    discovered_at TEXT NOT NULL,
    UNIQUE(series, episode_key)
);

CREATE INDEX IF NOT EXISTS idx_chapters_series ON chapters(series);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
