//! Content extraction for fetched pages
//!
//! This module turns a successful [`FetchResult`] into a [`ScrapedPage`]:
//! - Page title (from `<title>`)
//! - Ordered text sections, each tagged with its enclosing heading chain
//! - Every `href`/`src` target, resolved and normalized
//!
//! # Section Rules
//!
//! | Element | Result |
//! |---------|--------|
//! | `h1`-`h6` | Sets the heading context, no section of its own |
//! | `p`, `pre`, `blockquote`, `figcaption`, `address` | One section |
//! | `ul`, `ol`, `dl` | One section, one line per item |
//! | `table` | One section, one line per row |
//! | Loose text inside containers | One section per run of text |
//! | `script`, `style`, `noscript`, `template`, `svg`, `iframe`, `head` | Skipped |
//!
//! Extraction is synchronous and depends only on the fetch result, so equal
//! inputs always produce equal pages.

use crate::crawler::fetcher::FetchResult;
use crate::document::{ScrapedPage, TextSection};
use crate::url::NormalizedUrl;
use scraper::{ElementRef, Html, Node, Selector};
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::collections::BTreeSet;
use std::fmt;
use std::io::Cursor;
use thiserror::Error;
use url::Url;

/// Subtrees whose text never reaches a section
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "head",
];

/// Elements that become exactly one section
const BLOCK_LEAVES: &[&str] = &["p", "pre", "blockquote", "figcaption", "address"];

/// Elements whose text flows into the surrounding run of loose text
const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "del", "dfn", "em", "font", "i",
    "img", "ins", "kbd", "label", "mark", "q", "s", "samp", "small", "span", "strong", "sub",
    "sup", "time", "u", "var", "wbr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractErrorKind {
    /// The content type is neither HTML-like nor plain text
    UnsupportedContentType,
    /// The fetch failed or the body could not be turned into a page
    ParseFailure,
}

impl fmt::Display for ExtractErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedContentType => f.write_str("unsupported content type"),
            Self::ParseFailure => f.write_str("parse failure"),
        }
    }
}

/// Terminal per-page extraction failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ExtractError {
    pub kind: ExtractErrorKind,
    pub message: String,
}

impl ExtractError {
    fn unsupported(content_type: &str) -> Self {
        Self {
            kind: ExtractErrorKind::UnsupportedContentType,
            message: format!("cannot extract '{}'", content_type),
        }
    }

    fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ExtractErrorKind::ParseFailure,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Html,
    PlainText,
    Xml,
}

/// Maps a Content-Type header onto the body kind it announces
///
/// A missing header is treated as HTML.
fn body_kind(content_type: Option<&str>) -> Result<BodyKind, ExtractError> {
    let Some(raw) = content_type else {
        return Ok(BodyKind::Html);
    };

    let mime = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "" | "text/html" | "application/xhtml+xml" => Ok(BodyKind::Html),
        "text/plain" => Ok(BodyKind::PlainText),
        "application/xml" | "text/xml" => Ok(BodyKind::Xml),
        _ => Err(ExtractError::unsupported(raw)),
    }
}

fn usable_body(result: &FetchResult) -> Result<String, ExtractError> {
    if let Some(error) = &result.error {
        return Err(ExtractError::parse(format!("fetch failed: {}", error)));
    }
    if result.body.is_empty() {
        return Err(ExtractError::parse("empty body"));
    }
    Ok(String::from_utf8_lossy(&result.body).into_owned())
}

/// Extracts a page from a successful fetch
///
/// # Errors
///
/// * `UnsupportedContentType` - the body is not HTML-like or plain text
/// * `ParseFailure` - the fetch carries an error or the body is empty
pub fn extract(result: &FetchResult) -> Result<ScrapedPage, ExtractError> {
    let kind = match body_kind(result.content_type())? {
        BodyKind::Xml => {
            return Err(ExtractError::unsupported(
                result.content_type().unwrap_or_default(),
            ))
        }
        kind => kind,
    };
    let body = usable_body(result)?;

    let (title, sections, links) = match kind {
        BodyKind::PlainText => (None, plain_text_sections(&body), BTreeSet::new()),
        _ => {
            let document = Html::parse_document(&body);
            let base = base_url(&document, &result.final_url);
            let mut walker = SectionWalker::default();
            walker.walk(document.root_element());
            walker.flush();
            (
                extract_title(&document),
                walker.sections,
                extract_links(&document, &base),
            )
        }
    };

    Ok(ScrapedPage {
        url: result.url.clone(),
        title,
        sections,
        links,
        fetched_at: result.fetched_at,
    })
}

/// Parses a sitemap into a page whose links are the listed leaf URLs
///
/// Accepts `<urlset>` XML and plain-text sitemaps (one URL per line). Entries
/// of a `<sitemapindex>` are logged and ignored; only flat sitemaps are
/// expanded.
pub fn extract_sitemap(result: &FetchResult) -> Result<ScrapedPage, ExtractError> {
    let kind = body_kind(result.content_type())?;
    let body = usable_body(result)?;

    let links = if kind == BodyKind::PlainText || !body.trim_start().starts_with('<') {
        body.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| NormalizedUrl::parse(line).ok())
            .collect()
    } else {
        sitemap_entries(&result.body, &result.url)?
    };

    tracing::debug!("Sitemap {} lists {} URL(s)", result.url, links.len());

    Ok(ScrapedPage {
        url: result.url.clone(),
        title: None,
        sections: Vec::new(),
        links,
        fetched_at: result.fetched_at,
    })
}

fn sitemap_entries(
    xml: &[u8],
    sitemap_url: &NormalizedUrl,
) -> Result<BTreeSet<NormalizedUrl>, ExtractError> {
    let mut links = BTreeSet::new();
    let mut nested = 0usize;

    for entity in SiteMapReader::new(Cursor::new(xml)) {
        match entity {
            SiteMapEntity::Url(entry) => {
                if let Some(url) = entry.loc.get_url() {
                    match NormalizedUrl::try_from(url) {
                        Ok(url) => {
                            links.insert(url);
                        }
                        Err(e) => tracing::debug!("Skipping sitemap entry: {}", e),
                    }
                }
            }
            SiteMapEntity::SiteMap(entry) => {
                nested += 1;
                if let Some(url) = entry.loc.get_url() {
                    tracing::debug!("Ignoring nested sitemap {}", url);
                }
            }
            SiteMapEntity::Err(e) => {
                if links.is_empty() && nested == 0 {
                    return Err(ExtractError::parse(format!("invalid sitemap: {:?}", e)));
                }
                tracing::warn!(
                    "Sitemap {} is malformed after {} entries: {:?}",
                    sitemap_url,
                    links.len(),
                    e
                );
                break;
            }
        }
    }

    if nested > 0 {
        tracing::warn!(
            "Sitemap {} references {} nested sitemap(s); nested sitemaps are not followed",
            sitemap_url,
            nested
        );
    }

    Ok(links)
}

/// Splits plain text into blank-line-separated paragraphs
fn plain_text_sections(body: &str) -> Vec<TextSection> {
    let mut sections = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for line in body.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !paragraph.is_empty() {
                sections.push(TextSection {
                    heading: None,
                    level: 0,
                    text: collapse_whitespace(&paragraph.join(" ")),
                    path: Vec::new(),
                });
                paragraph.clear();
            }
        } else {
            paragraph.push(line);
        }
    }

    sections
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Resolution base: `<base href>` when present and valid, else the final URL
fn base_url(document: &Html, final_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|element| element.value().attr("href"))
                .and_then(|href| final_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| final_url.clone())
}

/// Collects every `href`/`src` target in the document
fn extract_links(document: &Html, base: &Url) -> BTreeSet<NormalizedUrl> {
    let mut links = BTreeSet::new();
    let Ok(selector) = Selector::parse("[href], [src]") else {
        return links;
    };

    for element in document.select(&selector) {
        let element = element.value();
        if element.name() == "base" || element.attr("download").is_some() {
            continue;
        }
        for target in [element.attr("href"), element.attr("src")].into_iter().flatten() {
            if let Some(url) = resolve_link(target, base) {
                links.insert(url);
            }
        }
    }

    links
}

/// Resolves a link target to a normalized absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only (same page) links
/// - Invalid or non-HTTP(S) URLs
fn resolve_link(target: &str, base: &Url) -> Option<NormalizedUrl> {
    let target = target.trim();
    if target.is_empty() || target.starts_with('#') {
        return None;
    }

    let lowered = target.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(target).ok()?;
    NormalizedUrl::try_from(absolute).ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_skipped(name: &str) -> bool {
    SKIPPED_ELEMENTS.contains(&name)
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Concatenated text of an element, skipping excluded subtrees
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_visible_text(element, &mut out);
    out
}

fn push_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            Node::Element(el) if !is_skipped(el.name()) => {
                if let Some(child) = ElementRef::wrap(child) {
                    push_visible_text(child, out);
                }
            }
            _ => {}
        }
    }
}

/// Document-order walk producing sections under a heading stack
#[derive(Debug, Default)]
struct SectionWalker {
    headings: Vec<(u8, String)>,
    loose: String,
    sections: Vec<TextSection>,
}

impl SectionWalker {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.loose.push_str(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.visit(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();

        if is_skipped(name) {
            return;
        }

        if name == "br" {
            self.loose.push(' ');
            return;
        }

        if INLINE_ELEMENTS.contains(&name) {
            self.walk(element);
            return;
        }

        self.flush();

        if let Some(level) = heading_level(name) {
            let text = collapse_whitespace(&visible_text(element));
            if !text.is_empty() {
                while self.headings.last().map_or(false, |(l, _)| *l >= level) {
                    self.headings.pop();
                }
                self.headings.push((level, text));
            }
            return;
        }

        match name {
            "pre" => {
                let text = visible_text(element);
                self.push_section(text.trim_matches('\n').trim_end().to_string());
            }
            "ul" | "ol" | "dl" => {
                let lines = element
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|item| matches!(item.value().name(), "li" | "dt" | "dd"))
                    .map(|item| collapse_whitespace(&visible_text(item)));
                self.push_lines(lines);
            }
            "table" => {
                let lines = table_rows(element).into_iter().map(|row| {
                    row.children()
                        .filter_map(ElementRef::wrap)
                        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                        .map(|cell| collapse_whitespace(&visible_text(cell)))
                        .filter(|cell| !cell.is_empty())
                        .collect::<Vec<_>>()
                        .join(" | ")
                });
                self.push_lines(lines);
            }
            _ if BLOCK_LEAVES.contains(&name) => {
                self.push_section(collapse_whitespace(&visible_text(element)));
            }
            _ => {
                self.walk(element);
                self.flush();
            }
        }
    }

    /// Emits the pending loose text, if any, as its own section
    fn flush(&mut self) {
        let text = collapse_whitespace(&self.loose);
        self.loose.clear();
        self.push_section(text);
    }

    fn push_lines(&mut self, lines: impl Iterator<Item = String>) {
        let text = lines
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        self.push_section(text);
    }

    fn push_section(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let (heading, level) = match self.headings.last() {
            Some((level, heading)) => (Some(heading.clone()), *level),
            None => (None, 0),
        };
        self.sections.push(TextSection {
            heading,
            level,
            text,
            path: self.headings.iter().map(|(_, h)| h.clone()).collect(),
        });
    }
}

/// Rows of a table, excluding rows of nested tables
fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|row| row.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}
