//! Configurable HTML source adapter
//!
//! Most reading sites publish a chapter as one HTML document listing its page
//! images and linking to the next chapter. This adapter reads both with CSS
//! selectors from the `[[source]]` configuration and extracts episode markers
//! from chapter URLs with a regular expression.

use crate::chain::{Chapter, Source, SourceError};
use crate::config::SourceEntry;
use crate::model::{archive_path, ChapterRecord, EpisodeKey, SeriesRecord};
use crate::transport::{AuthContext, RetryPolicy, Transport, TransportError};
use crate::ConfigError;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Everything chapters of one source share
struct SourceContext {
    domain: String,
    page_selector: Selector,
    page_attribute: String,
    next_selector: Option<Selector>,
    episode_pattern: Regex,
    unavailable_status: Vec<u16>,
    auth: AuthContext,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    library_root: PathBuf,
}

/// Selector-driven adapter for one domain
#[derive(Clone)]
pub struct HtmlSource {
    ctx: Arc<SourceContext>,
}

impl HtmlSource {
    /// Builds the adapter from its configuration entry
    ///
    /// # Arguments
    ///
    /// * `entry` - The `[[source]]` entry
    /// * `transport` - Transport used for chapter documents and pages
    /// * `retry` - Retry policy applied to document fetches
    /// * `library_root` - Root directory of the archive library
    ///
    /// # Returns
    ///
    /// * `Ok(HtmlSource)` - Adapter ready to open chapters
    /// * `Err(ConfigError)` - A selector or the episode pattern does not parse
    pub fn from_entry(
        entry: &SourceEntry,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        library_root: &Path,
    ) -> Result<Self, ConfigError> {
        let page_selector = parse_selector(&entry.page_selector)?;
        let next_selector = entry
            .next_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?;
        let episode_pattern = Regex::new(&entry.episode_pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", entry.episode_pattern, e)))?;

        Ok(Self {
            ctx: Arc::new(SourceContext {
                domain: entry.domain.to_ascii_lowercase(),
                page_selector,
                page_attribute: entry.page_attribute.clone(),
                next_selector,
                episode_pattern,
                unavailable_status: entry.unavailable_status.clone(),
                auth: AuthContext::new(entry.headers.clone(), entry.cookies.clone()),
                transport,
                retry,
                library_root: library_root.to_path_buf(),
            }),
        })
    }

    /// Extracts the episode key from a chapter URL
    pub fn episode_from_url(&self, url: &str) -> Option<EpisodeKey> {
        self.ctx.episode_from_url(url)
    }
}

impl SourceContext {
    fn episode_from_url(&self, url: &str) -> Option<EpisodeKey> {
        let captures = self.episode_pattern.captures(url)?;
        EpisodeKey::parse(captures.get(1)?.as_str())
    }
}

impl Source for HtmlSource {
    fn domain(&self) -> &str {
        &self.ctx.domain
    }

    fn open(&self, _series: &SeriesRecord, record: ChapterRecord) -> Box<dyn Chapter> {
        Box::new(HtmlChapter::new(self.ctx.clone(), record))
    }
}

/// One chapter document, fetched lazily and at most once
struct HtmlChapter {
    ctx: Arc<SourceContext>,
    record: ChapterRecord,
    path: PathBuf,
    document: OnceCell<String>,
}

impl HtmlChapter {
    fn new(ctx: Arc<SourceContext>, record: ChapterRecord) -> Self {
        let path = archive_path(&ctx.library_root, &record.series, &record.episode);
        Self {
            ctx,
            record,
            path,
            document: OnceCell::new(),
        }
    }

    fn base_url(&self) -> Result<Url, SourceError> {
        Url::parse(&self.record.url).map_err(|e| {
            SourceError::Transport(TransportError::InvalidUrl {
                url: self.record.url.clone(),
                message: e.to_string(),
            })
        })
    }

    async fn document(&self, cancel: &CancellationToken) -> Result<&str, SourceError> {
        let document = self
            .document
            .get_or_try_init(|| async {
                let body = self
                    .ctx
                    .retry
                    .fetch(self.ctx.transport.as_ref(), &self.record.url, &self.ctx.auth, cancel)
                    .await
                    .map_err(|e| self.classify(e))?;
                Ok::<_, SourceError>(String::from_utf8_lossy(&body).into_owned())
            })
            .await?;
        Ok(document.as_str())
    }

    fn classify(&self, error: TransportError) -> SourceError {
        match error.status() {
            Some(status) if self.ctx.unavailable_status.contains(&status) => {
                SourceError::ContentUnavailable(format!("{} answered {}", self.record.url, status))
            }
            _ => SourceError::Transport(error),
        }
    }
}

#[async_trait]
impl Chapter for HtmlChapter {
    fn record(&self) -> &ChapterRecord {
        &self.record
    }

    fn archive_path(&self) -> PathBuf {
        self.path.clone()
    }

    fn auth(&self) -> &AuthContext {
        &self.ctx.auth
    }

    fn check_page(&self, bytes: &[u8]) -> Result<(), String> {
        if bytes.is_empty() {
            return Err("empty body".to_string());
        }
        let head = bytes.iter().find(|b| !b.is_ascii_whitespace());
        if head == Some(&b'<') {
            return Err("markup instead of an image".to_string());
        }
        Ok(())
    }

    async fn pages(&self, cancel: &CancellationToken) -> Result<Vec<String>, SourceError> {
        let base = self.base_url()?;
        let document = self.document(cancel).await?;
        Ok(extract_pages(
            document,
            &base,
            &self.ctx.page_selector,
            &self.ctx.page_attribute,
        ))
    }

    async fn next(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn Chapter>>, SourceError> {
        let Some(selector) = &self.ctx.next_selector else {
            return Ok(None);
        };
        let base = self.base_url()?;
        let document = self.document(cancel).await?;

        let Some(link) = extract_next(document, selector) else {
            return Ok(None);
        };

        let url = resolve_link(&link.href, &base)
            .ok_or_else(|| SourceError::InvalidReference(link.href.clone()))?;
        if url == base.as_str() {
            return Ok(None);
        }

        let episode = self
            .ctx
            .episode_from_url(&url)
            .ok_or_else(|| SourceError::InvalidReference(url.clone()))?;

        let name = if link.text.is_empty() {
            format!("{} {}", self.record.series, episode)
        } else {
            link.text
        };

        let record = ChapterRecord::new(&self.record.series, episode, name, url);
        Ok(Some(Box::new(HtmlChapter::new(self.ctx.clone(), record))))
    }
}

struct NextLink {
    href: String,
    text: String,
}

/// Collects page URLs in document order
fn extract_pages(html: &str, base_url: &Url, selector: &Selector, attribute: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .filter_map(|element| element.value().attr(attribute))
        .filter_map(|value| resolve_link(value, base_url))
        .collect()
}

/// Finds the first successor link
fn extract_next(html: &str, selector: &Selector) -> Option<NextLink> {
    let document = Html::parse_document(html);
    let element = document
        .select(selector)
        .find(|element| element.value().attr("href").is_some())?;
    Some(NextLink {
        href: element.value().attr("href")?.trim().to_string(),
        text: element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    })
}

/// Resolves a link against the chapter URL
///
/// Returns None if the link should be excluded:
/// - empty and fragment-only links
/// - javascript:, mailto:, tel: schemes and data: URIs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {}", selector, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransport, Reply};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const CHAPTER_URL: &str = "https://scans.example/manga/alpha/1";

    fn entry() -> SourceEntry {
        SourceEntry {
            domain: "Scans.Example".to_string(),
            page_selector: "div#all img".to_string(),
            page_attribute: "data-src".to_string(),
            next_selector: Some("a.next".to_string()),
            episode_pattern: r"/(\d+(?:\.\d+)?)/?$".to_string(),
            unavailable_status: vec![404, 500],
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
        }
    }

    fn chapter_html(next: &str) -> String {
        format!(
            r#"<html><body>
            <div id="all">
              <img data-src=" /img/alpha/1/01.jpg ">
              <img data-src="https://cdn.example/alpha/1/02.png">
              <img src="ignored.jpg">
            </div>
            <img data-src="/ads/banner.jpg">
            {}
            </body></html>"#,
            next
        )
    }

    fn open(transport: Arc<FakeTransport>, dir: &TempDir) -> Box<dyn Chapter> {
        let source =
            HtmlSource::from_entry(&entry(), transport, RetryPolicy::no_retry(), dir.path())
                .unwrap();
        let series = SeriesRecord::new("alpha", "scans.example", "en", CHAPTER_URL, EpisodeKey::Integer(1));
        source.open(&series, series.root_chapter())
    }

    #[test]
    fn test_episode_from_url() {
        let source = HtmlSource::from_entry(
            &entry(),
            Arc::new(FakeTransport::new()),
            RetryPolicy::no_retry(),
            Path::new("/lib"),
        )
        .unwrap();

        assert_eq!(source.domain(), "scans.example");
        assert_eq!(
            source.episode_from_url("https://scans.example/manga/alpha/12"),
            Some(EpisodeKey::Integer(12))
        );
        assert_eq!(
            source.episode_from_url("https://scans.example/manga/alpha/12.5/"),
            Some(EpisodeKey::Decimal(12.5))
        );
        assert_eq!(source.episode_from_url("https://scans.example/manga/alpha"), None);
    }

    #[tokio::test]
    async fn test_pages_are_resolved_in_document_order() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.route(CHAPTER_URL, Reply::Body(chapter_html("").into_bytes()));

        let chapter = open(transport.clone(), &dir);
        let pages = chapter.pages(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            pages,
            vec![
                "https://scans.example/img/alpha/1/01.jpg",
                "https://cdn.example/alpha/1/02.png",
            ]
        );
        assert_eq!(chapter.archive_path(), dir.path().join("alpha").join("1.cbz"));
    }

    #[tokio::test]
    async fn test_document_is_fetched_once() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.route(
            CHAPTER_URL,
            Reply::Body(chapter_html(r#"<a class="next" href="/manga/alpha/2">Chapter 2</a>"#).into_bytes()),
        );

        let chapter = open(transport.clone(), &dir);
        let cancel = CancellationToken::new();
        chapter.pages(&cancel).await.unwrap();
        let next = chapter.next(&cancel).await.unwrap().unwrap();

        assert_eq!(transport.call_count(CHAPTER_URL), 1);
        assert_eq!(next.episode(), &EpisodeKey::Integer(2));
        assert_eq!(next.record().url, "https://scans.example/manga/alpha/2");
        assert_eq!(next.record().name, "Chapter 2");
        assert_eq!(next.series(), "alpha");
    }

    #[tokio::test]
    async fn test_missing_or_self_link_ends_chain() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();

        let transport = Arc::new(FakeTransport::new());
        transport.route(CHAPTER_URL, Reply::Body(chapter_html("").into_bytes()));
        assert!(open(transport, &dir).next(&cancel).await.unwrap().is_none());

        let transport = Arc::new(FakeTransport::new());
        transport.route(
            CHAPTER_URL,
            Reply::Body(chapter_html(r#"<a class="next" href="/manga/alpha/1">again</a>"#).into_bytes()),
        );
        assert!(open(transport, &dir).next(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unusable_link_is_invalid_reference() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();

        let transport = Arc::new(FakeTransport::new());
        transport.route(
            CHAPTER_URL,
            Reply::Body(chapter_html(r#"<a class="next" href="javascript:void(0)">next</a>"#).into_bytes()),
        );
        assert!(matches!(
            open(transport, &dir).next(&cancel).await,
            Err(SourceError::InvalidReference(_))
        ));

        let transport = Arc::new(FakeTransport::new());
        transport.route(
            CHAPTER_URL,
            Reply::Body(chapter_html(r#"<a class="next" href="/manga/alpha/">next</a>"#).into_bytes()),
        );
        assert!(matches!(
            open(transport, &dir).next(&cancel).await,
            Err(SourceError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_status_maps_to_content_unavailable() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();

        let transport = Arc::new(FakeTransport::new());
        transport.route(CHAPTER_URL, Reply::Status(500));
        assert!(matches!(
            open(transport, &dir).pages(&cancel).await,
            Err(SourceError::ContentUnavailable(_))
        ));

        let transport = Arc::new(FakeTransport::new());
        transport.route(CHAPTER_URL, Reply::Status(403));
        assert!(matches!(
            open(transport, &dir).pages(&cancel).await,
            Err(SourceError::Transport(TransportError::Status { status: 403, .. }))
        ));
    }

    #[test]
    fn test_check_page_rejects_markup() {
        let dir = TempDir::new().unwrap();
        let chapter = open(Arc::new(FakeTransport::new()), &dir);

        assert!(chapter.check_page(b"\xff\xd8\xff\xe0").is_ok());
        assert!(chapter.check_page(b"").is_err());
        assert!(chapter.check_page(b"  <!DOCTYPE html>").is_err());
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse(CHAPTER_URL).unwrap();
        assert_eq!(
            resolve_link("2", &base),
            Some("https://scans.example/manga/alpha/2".to_string())
        );
        assert_eq!(resolve_link("#top", &base), None);
        assert_eq!(resolve_link("mailto:a@b.c", &base), None);
        assert_eq!(resolve_link("ftp://scans.example/x", &base), None);
    }
}
