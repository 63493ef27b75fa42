//! Integration tests for the harvester
//!
//! These tests use wiremock to serve chapter documents and page images and
//! run the full harvest cycle end-to-end: HTML source, HTTP transport,
//! SQLite progress store and CBZ archives on disk.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use toon_leech::config::{load_config, Config};
use toon_leech::model::EpisodeKey;
use toon_leech::storage::{ProgressStore, SqliteStore};
use toon_leech::transport::HttpTransport;
use toon_leech::{HarvestEngine, LeechError, SeriesOutcome};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JPEG: &[u8] = b"\xff\xd8\xff\xe0fake-jpeg";

struct Harness {
    dir: TempDir,
    config: Config,
    store: Arc<SqliteStore>,
}

impl Harness {
    /// Writes a config pointing at the mock server and loads it
    fn new(server: &MockServer, unavailable: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let host = url::Url::parse(&server.uri())
            .unwrap()
            .host_str()
            .unwrap()
            .to_string();

        let content = format!(
            r#"
[harvest]
page-concurrency = 2

[retry]
max-attempts = 2
initial-backoff-ms = 1
max-backoff-ms = 2

[storage]
database-path = "{db}"
library-root = "{lib}"

[[source]]
domain = "{host}"
page-selector = "div.reader img"
next-selector = "a.next"
episode-pattern = '/(\d+)$'
unavailable-status = {unavailable}

[source.cookies]
needGDPR = "false"

[[series]]
name = "alpha"
domain = "{host}"
start-url = "{uri}/manga/alpha/1"
start-episode = "1"
"#,
            db = dir.path().join("leech.db").display(),
            lib = dir.path().join("library").display(),
            host = host,
            uri = server.uri(),
            unavailable = unavailable,
        );
        let config_path = dir.path().join("leech.toml");
        std::fs::write(&config_path, content).unwrap();

        let config = load_config(&config_path).unwrap();
        let store = Arc::new(SqliteStore::new(Path::new(&config.storage.database_path)).unwrap());
        Self { dir, config, store }
    }

    fn engine(&self) -> HarvestEngine {
        let transport = Arc::new(HttpTransport::new(&self.config.http).unwrap());
        let engine = HarvestEngine::from_config(
            &self.config,
            self.store.clone(),
            transport,
            CancellationToken::new(),
        )
        .unwrap();
        engine.subscribe(&self.config.series).unwrap();
        engine
    }

    fn archive(&self, episode: u64) -> PathBuf {
        self.dir
            .path()
            .join("library")
            .join("alpha")
            .join(format!("{}.cbz", episode))
    }
}

fn chapter_html(episode: u64, pages: usize, next: Option<u64>) -> String {
    let images: String = (0..pages)
        .map(|n| format!(r#"<img src="/img/{}/{}.jpg">"#, episode, n))
        .collect();
    let link = next
        .map(|n| format!(r#"<a class="next" href="/manga/alpha/{}">Chapter {}</a>"#, n, n))
        .unwrap_or_default();
    format!(
        "<html><body><div class=\"reader\">{}</div>{}</body></html>",
        images, link
    )
}

async fn serve_chapter(server: &MockServer, episode: u64, pages: usize, next: Option<u64>) {
    Mock::given(method("GET"))
        .and(path(format!("/manga/alpha/{}", episode)))
        .and(header("cookie", "needGDPR=false"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(chapter_html(episode, pages, next))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

async fn serve_images(server: &MockServer, episode: u64, pages: usize, expected: u64) {
    for n in 0..pages {
        Mock::given(method("GET"))
            .and(path(format!("/img/{}/{}.jpg", episode, n)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG))
            .expect(expected)
            .mount(server)
            .await;
    }
}

fn archive_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, JPEG);
        names.push(entry.name().to_string());
    }
    names
}

#[tokio::test]
async fn test_full_harvest_and_idempotent_rerun() {
    let server = MockServer::start().await;
    serve_chapter(&server, 1, 3, Some(2)).await;
    serve_chapter(&server, 2, 2, None).await;
    // images are fetched exactly once across both runs
    serve_images(&server, 1, 3, 1).await;
    serve_images(&server, 2, 2, 1).await;

    let harness = Harness::new(&server, "[404, 410]");
    let engine = harness.engine();

    let batch = engine.leech_all().await.unwrap();
    let report = batch.get("alpha").unwrap();
    assert_eq!(report.outcome, SeriesOutcome::Finished);
    assert_eq!(
        report.archived,
        vec![EpisodeKey::Integer(1), EpisodeKey::Integer(2)]
    );
    assert_eq!(
        archive_entries(&harness.archive(1)),
        vec!["000.jpg", "001.jpg", "002.jpg"]
    );
    assert_eq!(archive_entries(&harness.archive(2)), vec!["000.jpg", "001.jpg"]);

    let chapters = harness.store.chapters("alpha").unwrap();
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].next, Some(EpisodeKey::Integer(2)));
    assert_eq!(chapters[1].name, "Chapter 2");
    assert!(harness.store.get_series("alpha").unwrap().unwrap().finished);

    let rerun = engine.leech_one("alpha").await.unwrap();
    assert!(rerun.archived.is_empty());
    assert_eq!(rerun.outcome, SeriesOutcome::Finished);
}

#[tokio::test]
async fn test_missing_successor_soft_stops() {
    let server = MockServer::start().await;
    serve_chapter(&server, 1, 1, Some(2)).await;
    serve_images(&server, 1, 1, 1).await;
    Mock::given(method("GET"))
        .and(path("/manga/alpha/2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let harness = Harness::new(&server, "[404, 410]");
    let batch = harness.engine().leech_all().await.unwrap();

    let report = batch.get("alpha").unwrap();
    assert!(matches!(report.outcome, SeriesOutcome::SoftStopped { .. }));
    assert!(!batch.has_hard_failures());
    assert!(harness.archive(1).is_file());
    assert!(!harness.archive(2).exists());
    assert!(!harness.store.get_series("alpha").unwrap().unwrap().finished);
}

#[tokio::test]
async fn test_server_error_as_unavailable_marker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manga/alpha/1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let harness = Harness::new(&server, "[404, 500]");
    let batch = harness.engine().leech_all().await.unwrap();

    assert!(matches!(
        batch.get("alpha").unwrap().outcome,
        SeriesOutcome::SoftStopped { .. }
    ));
    assert!(!batch.has_hard_failures());
}

#[tokio::test]
async fn test_failed_page_leaves_no_archive() {
    let server = MockServer::start().await;
    serve_chapter(&server, 1, 2, Some(2)).await;
    Mock::given(method("GET"))
        .and(path("/img/1/0.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/1/1.jpg"))
        .respond_with(ResponseTemplate::new(503))
        // two attempts per run
        .expect(4)
        .mount(&server)
        .await;

    let harness = Harness::new(&server, "[404, 410]");
    let engine = harness.engine();

    let batch = engine.leech_all().await.unwrap();
    assert!(batch.has_hard_failures());
    assert!(!harness.archive(1).exists());
    assert!(harness.store.chapters("alpha").unwrap().is_empty());

    let error = engine.leech_one("alpha").await.unwrap_err();
    match error {
        LeechError::TransportFailure { failed_pages, .. } => assert_eq!(failed_pages, 1),
        other => panic!("unexpected error: {:?}", other),
    }
}
