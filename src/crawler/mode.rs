//! Mode controller: decides which discovered links are offered back
//!
//! [`plan`] is a pure function of the mode, the extracted page and its depth.
//! The frontier re-checks depth and domain on `offer`, so the filtering here
//! only keeps obviously useless entries out of the queue.

use crate::config::ScrapeMode;
use crate::crawler::frontier::FrontierEntry;
use crate::document::ScrapedPage;
use crate::url::{is_asset_url, DomainFilter};

/// Link admission limits applied while planning
#[derive(Debug, Clone, Default)]
pub struct LinkPolicy {
    pub max_depth: u32,
    pub filter: DomainFilter,
}

impl LinkPolicy {
    pub fn new(max_depth: u32, filter: DomainFilter) -> Self {
        Self { max_depth, filter }
    }
}

/// Computes the entries to offer after extracting `page` at `depth`
///
/// | Mode | Offers |
/// |------|--------|
/// | `SinglePage` | Nothing |
/// | `RecursiveCrawl` | Every allowed, non-asset link at `depth + 1 <= max_depth` |
/// | `Sitemap` | All allowed leaf URLs at depth 1 when `depth == 0`, nothing afterwards |
pub fn plan(
    mode: ScrapeMode,
    page: &ScrapedPage,
    depth: u32,
    policy: &LinkPolicy,
) -> Vec<FrontierEntry> {
    let child_depth = depth.saturating_add(1);

    let follow_assets = match mode {
        ScrapeMode::SinglePage => return Vec::new(),
        ScrapeMode::Sitemap if depth > 0 => return Vec::new(),
        ScrapeMode::Sitemap => true,
        ScrapeMode::RecursiveCrawl => false,
    };

    if child_depth > policy.max_depth {
        return Vec::new();
    }

    page.links
        .iter()
        .filter(|link| link != &&page.url)
        .filter(|link| policy.filter.allows(link.as_url()))
        .filter(|link| follow_assets || !is_asset_url(link.as_url()))
        .map(|link| FrontierEntry {
            url: link.clone(),
            depth: child_depth,
            origin: Some(page.url.clone()),
        })
        .collect()
}

/// Whether a page processed at `depth` becomes an emitted document
///
/// The sitemap itself only feeds the frontier.
pub fn emits(mode: ScrapeMode, depth: u32) -> bool {
    !(mode == ScrapeMode::Sitemap && depth == 0)
}

/// Whether a page at `depth` must go through the sitemap parse
pub fn is_sitemap_phase(mode: ScrapeMode, depth: u32) -> bool {
    mode == ScrapeMode::Sitemap && depth == 0
}
