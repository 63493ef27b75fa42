use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for Toon-Leech
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub storage: StorageConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub series: Vec<SeriesEntry>,
}

impl Config {
    /// Finds the source entry serving a domain (case-insensitive)
    pub fn source_for(&self, domain: &str) -> Option<&SourceEntry> {
        self.sources
            .iter()
            .find(|s| s.domain.eq_ignore_ascii_case(domain))
    }
}

/// Concurrency ceilings of the harvesting engine
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Maximum number of page fetches in flight for one chapter
    #[serde(rename = "page-concurrency", default = "default_page_concurrency")]
    pub page_concurrency: usize,

    /// Maximum number of series walked at the same time
    #[serde(rename = "series-concurrency", default = "default_series_concurrency")]
    pub series_concurrency: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_concurrency: default_page_concurrency(),
            series_concurrency: default_series_concurrency(),
        }
    }
}

/// Retry policy applied to every fetch
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per URL, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "initial-backoff-ms", default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(rename = "max-backoff-ms", default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite progress database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory holding one sub-directory of archives per series
    #[serde(rename = "library-root")]
    pub library_root: String,
}

impl StorageConfig {
    pub fn library_root(&self) -> PathBuf {
        PathBuf::from(&self.library_root)
    }
}

/// Per-domain description of how to read chapter documents
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    /// Host name the source serves (e.g. "scans.example")
    pub domain: String,

    /// CSS selector matching the page images of a chapter
    #[serde(rename = "page-selector")]
    pub page_selector: String,

    /// Attribute holding the image URL
    #[serde(rename = "page-attribute", default = "default_page_attribute")]
    pub page_attribute: String,

    /// CSS selector of the link to the next chapter; absent means single-chapter
    #[serde(rename = "next-selector", default)]
    pub next_selector: Option<String>,

    /// Regex with one capture group extracting the episode marker from a URL
    #[serde(rename = "episode-pattern")]
    pub episode_pattern: String,

    /// Document statuses meaning "this chapter does not exist (yet)"
    #[serde(rename = "unavailable-status", default = "default_unavailable_status")]
    pub unavailable_status: Vec<u16>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}

/// A subscribed series
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesEntry {
    /// Series name, also used as its directory name
    pub name: String,

    /// Domain of the source serving it
    pub domain: String,

    #[serde(default = "default_lang")]
    pub lang: String,

    /// Document URL of the first chapter
    #[serde(rename = "start-url")]
    pub start_url: String,

    /// Episode marker of the first chapter
    #[serde(rename = "start-episode")]
    pub start_episode: String,
}

fn default_page_concurrency() -> usize {
    3
}

fn default_series_concurrency() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    5000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_page_attribute() -> String {
    "src".to_string()
}

fn default_unavailable_status() -> Vec<u16> {
    vec![404, 410]
}

fn default_lang() -> String {
    "en".to_string()
}
