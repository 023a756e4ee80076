use crate::url::matcher::DomainPattern;
use url::Url;

/// File extensions that never hold crawlable page content
const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "json", "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp",
    "avif", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "webm", "ogg", "wav", "avi",
    "mov", "zip", "gz", "tgz", "bz2", "xz", "7z", "rar", "tar", "exe", "dmg", "iso",
];

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use trace_scraper::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true when the URL path ends in a static-asset extension
pub fn is_asset_url(url: &Url) -> bool {
    let last_segment = url.path().rsplit('/').next().unwrap_or("");
    match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            ASSET_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// Allowed-domain filter shared by the frontier and the mode controller
///
/// An empty pattern list admits every host.
#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    patterns: Vec<DomainPattern>,
}

impl DomainFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| DomainPattern::parse(p.as_ref()))
                .collect(),
        }
    }

    /// Builds the filter for a run
    ///
    /// Configured patterns win; with none configured the run is confined to
    /// the exact hosts of its seeds.
    pub fn for_run(configured: &[String], seeds: &[Url]) -> Self {
        if !configured.is_empty() {
            return Self::new(configured);
        }

        let mut patterns: Vec<DomainPattern> = Vec::new();
        for host in seeds.iter().filter_map(extract_domain) {
            let pattern = DomainPattern::Exact(host);
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        Self { patterns }
    }

    pub fn allows(&self, url: &Url) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        match url.host_str() {
            Some(host) => self.patterns.iter().any(|p| p.matches(host)),
            None => false,
        }
    }
}
