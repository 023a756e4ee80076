//! Trace: a concurrent web-content harvesting engine
//!
//! This crate fetches pages from seed URLs, extracts structured text sections and
//! links, and yields a stream of typed documents while respecting per-host rate
//! limits, bounded concurrency, and a retry/backoff failure model.

pub mod config;
pub mod crawler;
pub mod document;
pub mod output;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Trace operations
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Sink error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("Run supervisor failed: {0}")]
    Supervisor(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Trace operations
pub type Result<T> = std::result::Result<T, ScraperError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, FrontierOrder, RetryPolicy, ScrapeMode, ScraperConfig};
pub use crawler::{
    ExtractError, FetchError, FetchResult, Scraper, ScrapeRun, Transport, TransportError,
};
pub use document::{Document, ScrapedPage, TextSection};
pub use state::{RunSummary, StopReason};
pub use url::{normalize_url, NormalizedUrl};
