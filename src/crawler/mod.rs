//! Crawler module: the fetch/extract pipeline and its orchestration
//!
//! This module contains the core scraping logic, including:
//! - The transport capability and its `reqwest` implementation
//! - Bounded, polite, retrying fetches
//! - HTML, plain-text and sitemap extraction
//! - The deduplicating frontier and the mode controller
//! - The worker-pool engine producing the document stream

mod engine;
mod extractor;
mod fetcher;
mod frontier;
mod mode;
mod retry;
mod transport;

pub use engine::{CrawlFailure, FailureReason, ScrapeRun, Scraper};
pub use extractor::{extract, extract_sitemap, ExtractError, ExtractErrorKind};
pub use fetcher::{
    FetchError, FetchErrorKind, FetchResult, Fetcher, HostRateLimiter,
};
pub use frontier::{Claim, Frontier, FrontierEntry};
pub use mode::{emits, is_sitemap_phase, plan, LinkPolicy};
pub use retry::{AttemptOutcome, RetryDecision};
pub use transport::{build_http_client, HttpTransport, Transport, TransportError, TransportResponse};
