use crate::ConfigError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Trace
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seed URLs to start the run from
    #[serde(default)]
    pub seeds: Vec<String>,

    pub scraper: ScraperConfig,

    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Traversal behavior of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrapeMode {
    /// Fetch the seeds only; discovered links are never followed
    #[default]
    SinglePage,
    /// Follow discovered links up to the configured depth
    RecursiveCrawl,
    /// Seeds are sitemaps whose entries are fetched as single pages
    Sitemap,
}

impl std::fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SinglePage => "single-page",
            Self::RecursiveCrawl => "recursive-crawl",
            Self::Sitemap => "sitemap",
        };
        f.write_str(name)
    }
}

/// Order in which the frontier hands out pending entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrontierOrder {
    /// Breadth-first: entries come out in the order they were admitted
    #[default]
    Fifo,
    /// Shallowest depth first, ties broken by discovery order
    Priority,
}

/// Immutable configuration snapshot for a single run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScraperConfig {
    /// Traversal mode
    pub mode: ScrapeMode,

    /// Frontier ordering policy
    pub frontier_order: FrontierOrder,

    /// Maximum number of concurrent fetches (and worker pool size)
    pub concurrency_limit: usize,

    /// Requests per second allowed against a single host
    pub rate_limit: f64,

    /// Number of requests a host bucket can hold before throttling kicks in
    pub rate_limit_burst: u32,

    /// Per-attempt transport timeout (milliseconds)
    pub timeout_ms: u64,

    /// Retry policy for failed fetches
    pub retry: RetryPolicy,

    /// Maximum link-following depth from a seed
    pub max_depth: u32,

    /// Maximum number of documents emitted by the run
    pub max_pages: Option<usize>,

    /// Wall-clock budget for the whole run (seconds)
    pub deadline_secs: Option<u64>,

    /// Domain patterns links must match; empty means the seed hosts
    pub allowed_domains: Vec<String>,

    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,

    /// Capacity of the document channel between workers and the consumer
    pub output_buffer: usize,

    /// Drop in-flight transport calls as soon as the run is cancelled
    pub abandon_in_flight_on_cancel: bool,
}

impl ScraperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Converts the extra request headers into a header map
    ///
    /// Fails if a header name or value is not valid HTTP.
    pub fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigError::Validation(format!("Invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                ConfigError::Validation(format!("Invalid value for header '{}'", name))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            mode: ScrapeMode::default(),
            frontier_order: FrontierOrder::default(),
            concurrency_limit: 8,
            rate_limit: 2.0,
            rate_limit_burst: 1,
            timeout_ms: 30_000,
            retry: RetryPolicy::default(),
            max_depth: 2,
            max_pages: None,
            deadline_secs: None,
            allowed_domains: Vec::new(),
            headers: BTreeMap::new(),
            output_buffer: 16,
            abandon_in_flight_on_cancel: false,
        }
    }
}

/// Retry and backoff settings for the fetcher
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryPolicy {
    /// Total attempts per URL, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff delay (milliseconds)
    pub max_delay_ms: u64,

    /// Fraction of the delay added as random jitter, in [0, 1]
    pub jitter: f64,

    /// Statuses worth retrying; `None` means 429 and every 5xx
    pub retryable_statuses: Option<Vec<u16>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: 0.1,
            retryable_statuses: None,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value: `Name/Version (+URL; email)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "Trace".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}
