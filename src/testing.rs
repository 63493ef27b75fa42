//! Test doubles shared by the unit tests

use crate::chain::{Chapter, Source, SourceError};
use crate::model::{archive_path, ChapterRecord, EpisodeKey, SeriesRecord};
use crate::transport::{AuthContext, Transport, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Canned transport response
#[derive(Debug, Clone)]
pub enum Reply {
    Body(Vec<u8>),
    Status(u16),
    /// Answers with a body after sleeping
    Delayed(Vec<u8>, Duration),
    /// Never completes; used to exercise cancellation
    Hang,
}

impl Reply {
    pub fn body(content: &str) -> Self {
        Self::Body(content.as_bytes().to_vec())
    }

    pub fn delayed(content: &str, millis: u64) -> Self {
        Self::Delayed(content.as_bytes().to_vec(), Duration::from_millis(millis))
    }
}

/// Transport answering from per-URL reply queues
///
/// Replies are consumed in order; the last one repeats. Unknown URLs answer 404.
/// The transport also records the highest number of fetches in flight at once.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, url: &str, _auth: &AuthContext) -> Result<Vec<u8>, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.next_reply(url) {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Delayed(body, delay)) => {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(body)
            }
            Some(Reply::Status(status)) => Err(TransportError::Status {
                url: url.to_string(),
                status,
            }),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// What a scripted chapter answers to `pages()`
#[derive(Debug, Clone)]
pub enum ScriptedPages {
    Urls(Vec<String>),
    Unavailable,
}

/// What a scripted chapter answers to `next()`
#[derive(Debug, Clone)]
pub enum ScriptedNext {
    To(EpisodeKey),
    End,
    Unavailable,
    Invalid,
}

#[derive(Debug, Clone)]
struct ScriptedEntry {
    pages: ScriptedPages,
    next: ScriptedNext,
}

/// Shared script and call log behind `ScriptedSource`
#[derive(Default)]
struct Script {
    entries: Mutex<HashMap<(String, EpisodeKey), ScriptedEntry>>,
    pages_calls: Mutex<Vec<(String, EpisodeKey)>>,
    next_calls: Mutex<Vec<(String, EpisodeKey)>>,
    opened: Mutex<Vec<ChapterRecord>>,
}

/// Source whose chapters follow a script instead of parsing documents
#[derive(Clone)]
pub struct ScriptedSource {
    domain: String,
    library_root: PathBuf,
    script: Arc<Script>,
}

impl ScriptedSource {
    pub fn new(domain: &str, library_root: &Path) -> Self {
        Self {
            domain: domain.to_string(),
            library_root: library_root.to_path_buf(),
            script: Arc::new(Script::default()),
        }
    }

    /// Scripts one chapter; page URLs are `https://cdn.test/{series}/{episode}/{n}.jpg`
    pub fn chapter(&self, series: &str, episode: u64, page_count: usize, next: ScriptedNext) {
        let pages = (0..page_count)
            .map(|n| page_url(series, episode, n))
            .collect();
        self.chapter_with(series, episode, ScriptedPages::Urls(pages), next);
    }

    pub fn chapter_with(&self, series: &str, episode: u64, pages: ScriptedPages, next: ScriptedNext) {
        self.script.entries.lock().unwrap().insert(
            (series.to_string(), EpisodeKey::Integer(episode)),
            ScriptedEntry { pages, next },
        );
    }

    pub fn pages_called(&self, series: &str, episode: u64) -> bool {
        self.script
            .pages_calls
            .lock()
            .unwrap()
            .contains(&(series.to_string(), EpisodeKey::Integer(episode)))
    }

    pub fn next_calls(&self) -> usize {
        self.script.next_calls.lock().unwrap().len()
    }

    pub fn opened(&self) -> Vec<ChapterRecord> {
        self.script.opened.lock().unwrap().clone()
    }

    fn chapter_for(&self, record: ChapterRecord) -> Box<dyn Chapter> {
        Box::new(ScriptedChapter {
            source: self.clone(),
            path: archive_path(&self.library_root, &record.series, &record.episode),
            record,
            auth: AuthContext::default(),
        })
    }

    fn entry(&self, record: &ChapterRecord) -> Option<ScriptedEntry> {
        self.script
            .entries
            .lock()
            .unwrap()
            .get(&(record.series.clone(), record.episode.clone()))
            .cloned()
    }
}

pub fn page_url(series: &str, episode: u64, n: usize) -> String {
    format!("https://cdn.test/{}/{}/{}.jpg", series, episode, n)
}

impl Source for ScriptedSource {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn open(&self, _series: &SeriesRecord, record: ChapterRecord) -> Box<dyn Chapter> {
        self.script.opened.lock().unwrap().push(record.clone());
        self.chapter_for(record)
    }
}

struct ScriptedChapter {
    source: ScriptedSource,
    record: ChapterRecord,
    path: PathBuf,
    auth: AuthContext,
}

#[async_trait]
impl Chapter for ScriptedChapter {
    fn record(&self) -> &ChapterRecord {
        &self.record
    }

    fn archive_path(&self) -> PathBuf {
        self.path.clone()
    }

    fn auth(&self) -> &AuthContext {
        &self.auth
    }

    async fn pages(&self, _cancel: &CancellationToken) -> Result<Vec<String>, SourceError> {
        self.source
            .script
            .pages_calls
            .lock()
            .unwrap()
            .push((self.record.series.clone(), self.record.episode.clone()));
        match self.source.entry(&self.record).map(|e| e.pages) {
            Some(ScriptedPages::Urls(urls)) => Ok(urls),
            Some(ScriptedPages::Unavailable) | None => Err(SourceError::ContentUnavailable(
                format!("{} is gone", self.record.url),
            )),
        }
    }

    async fn next(&self, _cancel: &CancellationToken) -> Result<Option<Box<dyn Chapter>>, SourceError> {
        self.source
            .script
            .next_calls
            .lock()
            .unwrap()
            .push((self.record.series.clone(), self.record.episode.clone()));
        match self.source.entry(&self.record).map(|e| e.next) {
            Some(ScriptedNext::To(key)) => {
                let record = ChapterRecord::new(
                    &self.record.series,
                    key.clone(),
                    format!("fresh {}", key),
                    format!("https://scripted.test/{}/{}", self.record.series, key),
                );
                Ok(Some(self.source.chapter_for(record)))
            }
            Some(ScriptedNext::End) => Ok(None),
            Some(ScriptedNext::Invalid) => Err(SourceError::InvalidReference(
                "javascript:void(0)".to_string(),
            )),
            Some(ScriptedNext::Unavailable) | None => Err(SourceError::ContentUnavailable(
                "successor document is gone".to_string(),
            )),
        }
    }
}

/// Registers a series whose chapters live at `https://scripted.test/{name}/{n}`
pub fn scripted_series(name: &str, domain: &str) -> SeriesRecord {
    SeriesRecord::new(
        name,
        domain,
        "en",
        format!("https://scripted.test/{}/1", name),
        EpisodeKey::Integer(1),
    )
}
