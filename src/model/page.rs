use url::Url;

/// Image extensions kept as-is in archive entry names
const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "avif"];

/// Extension used when the URL does not reveal one
const DEFAULT_EXTENSION: &str = "jpg";

/// One page of a chapter, scheduled for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Position of the page within its chapter (zero-based)
    pub index: usize,

    /// Source URL of the page content
    pub url: String,

    /// Archive entry name, `{index:03}.{ext}`
    pub filename: String,
}

impl Page {
    /// Creates a page and derives its archive entry name
    ///
    /// # Examples
    ///
    /// ```
    /// use toon_leech::model::Page;
    ///
    /// let page = Page::new(4, "https://cdn.example/img/0004.PNG?token=x");
    /// assert_eq!(page.filename, "004.png");
    ///
    /// let page = Page::new(12, "https://cdn.example/img/page");
    /// assert_eq!(page.filename, "012.jpg");
    /// ```
    pub fn new(index: usize, url: impl Into<String>) -> Self {
        let url = url.into();
        let filename = format!("{:03}.{}", index, extension_for(&url));
        Self {
            index,
            url,
            filename,
        }
    }

    /// Builds the ordered page list of a chapter from its page URLs
    pub fn from_urls<I, S>(urls: I) -> Vec<Page>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .enumerate()
            .map(|(index, url)| Page::new(index, url))
            .collect()
    }
}

/// Picks the archive extension from the last path segment of a URL
fn extension_for(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    path.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| KNOWN_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
