//! Output data model: extracted pages and the documents emitted by a run

use crate::config::ScrapeMode;
use crate::url::NormalizedUrl;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// One structural unit of extracted content
///
/// A paragraph, list, table or loose text block, tagged with the heading it
/// sits under. `level` is the level of that heading (1-6), or 0 for content
/// that precedes every heading. `path` holds the texts of the enclosing
/// heading chain, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSection {
    pub heading: Option<String>,
    pub level: u8,
    pub text: String,
    pub path: Vec<String>,
}

/// Structured content extracted from one fetched page
///
/// Sections are in document order. Links are kept sorted so two extractions
/// of the same bytes compare equal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapedPage {
    pub url: NormalizedUrl,
    pub title: Option<String>,
    pub sections: Vec<TextSection>,
    pub links: BTreeSet<NormalizedUrl>,
    pub fetched_at: DateTime<Utc>,
}

/// The externally visible unit a run emits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub page: ScrapedPage,
    pub depth: u32,
    pub scrape_mode: ScrapeMode,
    pub run_id: String,
}

impl Document {
    pub fn url(&self) -> &NormalizedUrl {
        &self.page.url
    }
}
