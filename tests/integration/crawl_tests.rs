//! Integration tests for the scraper engine
//!
//! Most tests drive the engine through an in-memory transport serving a
//! small synthetic site, so link graphs, failures and timing are fully under
//! control. One test uses wiremock to run the full cycle over real HTTP.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trace_scraper::config::{ScrapeMode, ScraperConfig, UserAgentConfig};
use trace_scraper::crawler::{
    CrawlFailure, FailureReason, FetchErrorKind, ScrapeRun, Scraper, Transport, TransportError,
    TransportResponse,
};
use trace_scraper::output::{JsonLinesSink, MemorySink};
use trace_scraper::{ConfigError, Document, RunSummary, ScraperError, StopReason};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SITE: &str = "https://site.test";

/// What the synthetic site answers for one URL
#[derive(Clone)]
enum Reply {
    Html(String),
    Xml(String),
    Status(u16),
    /// 503 for the first `failures` calls, then the page
    Flaky { failures: u32, body: String },
    Panic,
}

/// In-memory transport that records every call
struct SiteTransport {
    replies: HashMap<String, Reply>,
    fallback: Option<fn(&Url) -> Reply>,
    delay: Duration,
    calls: Mutex<HashMap<String, u32>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SiteTransport {
    fn new() -> Self {
        Self {
            replies: HashMap::new(),
            fallback: None,
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn page(self, path: &str, body: &str) -> Self {
        self.reply(path, Reply::Html(body.to_string()))
    }

    fn reply(mut self, path: &str, reply: Reply) -> Self {
        self.replies.insert(format!("{}{}", SITE, path), reply);
        self
    }

    fn fallback(mut self, fallback: fn(&Url) -> Reply) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self, path: &str) -> u32 {
        let calls = self.calls.lock().unwrap();
        calls.get(&format!("{}{}", SITE, path)).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    fn all_calls(&self) -> HashMap<String, u32> {
        self.calls.lock().unwrap().clone()
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn response(url: &Url, status: u16, content_type: &'static str, body: String) -> TransportResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    TransportResponse {
        final_url: url.clone(),
        status,
        headers,
        body: body.into_bytes(),
    }
}

#[async_trait]
impl Transport for SiteTransport {
    async fn fetch(
        &self,
        url: &Url,
        _headers: &HeaderMap,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let key = url.as_str().to_string();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.peak.fetch_max(active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self
            .replies
            .get(&key)
            .cloned()
            .or_else(|| self.fallback.map(|f| f(url)));

        Ok(match reply {
            None => response(url, 404, "text/html", String::new()),
            Some(Reply::Html(body)) => response(url, 200, "text/html", body),
            Some(Reply::Xml(body)) => response(url, 200, "application/xml", body),
            Some(Reply::Status(status)) => response(url, status, "text/html", String::new()),
            Some(Reply::Flaky { failures, .. }) if call <= failures => {
                response(url, 503, "text/html", String::new())
            }
            Some(Reply::Flaky { body, .. }) => response(url, 200, "text/html", body),
            Some(Reply::Panic) => panic!("transport blew up on {}", url),
        })
    }
}

/// Page `/n` links to `/n+1` and `/n+2`, forever
fn endless(url: &Url) -> Reply {
    let n: u64 = url.path().trim_start_matches('/').parse().unwrap_or(0);
    Reply::Html(format!(
        r#"<h1>Page {n}</h1><p>Body {n}</p><a href="/{a}">next</a><a href="/{b}">skip</a>"#,
        n = n,
        a = n + 1,
        b = n + 2
    ))
}

fn config(mode: ScrapeMode) -> ScraperConfig {
    let mut config = ScraperConfig {
        mode,
        concurrency_limit: 4,
        rate_limit: 1_000.0,
        rate_limit_burst: 1_000,
        timeout_ms: 2_000,
        max_depth: 5,
        ..ScraperConfig::default()
    };
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter = 0.0;
    config
}

fn start(config: ScraperConfig, transport: &Arc<SiteTransport>, seeds: &[&str]) -> ScrapeRun {
    let seeds: Vec<String> = seeds.iter().map(|s| format!("{}{}", SITE, s)).collect();
    Scraper::new(config, transport.clone())
        .expect("valid config")
        .run(&seeds)
        .expect("valid seeds")
}

async fn collect(mut run: ScrapeRun) -> (Vec<Document>, Vec<CrawlFailure>, RunSummary) {
    let mut documents = Vec::new();
    while let Some(document) = run.next().await {
        documents.push(document);
    }
    let failures = run.take_failures();
    let summary = run.finish().await.expect("supervisor finished");
    (documents, failures, summary)
}

fn paths(documents: &[Document]) -> BTreeSet<String> {
    documents
        .iter()
        .map(|d| d.url().as_url().path().to_string())
        .collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_full_scrape_over_http() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                r#"<html><head><title>Home</title></head><body>
                <h1>Welcome</h1><p>Start here.</p>
                <a href="/a">A</a> <a href="/missing">Missing</a>
                <a href="https://elsewhere.invalid/">External</a>
                </body></html>"#,
                "text/html",
            ),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                r#"<h2>A</h2><ul><li>one</li><li>two</li></ul><a href="/">home</a>"#,
                "text/html; charset=utf-8",
            ),
        )
        .mount(&server)
        .await;

    let mut config = config(ScrapeMode::RecursiveCrawl);
    config.max_depth = 2;

    let scraper = Scraper::with_http(config, &UserAgentConfig::default()).unwrap();
    let mut run = scraper.run(&[format!("{}/", base)]).unwrap();

    let mut documents = Vec::new();
    while let Some(document) = run.next().await {
        documents.push(document);
    }
    let failures = run.take_failures();
    let summary = run.finish().await.unwrap();

    assert_eq!(paths(&documents), set(&["/", "/a"]));
    assert_eq!(summary.stopped_reason, StopReason::FrontierExhausted);
    assert_eq!(summary.documents_emitted, 2);
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.pages_failed, 1);

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].url.as_url().path(), "/missing");

    let home = documents.iter().find(|d| d.url().as_url().path() == "/").unwrap();
    assert_eq!(home.depth, 0);
    assert_eq!(home.page.title.as_deref(), Some("Home"));
    assert_eq!(home.page.sections[0].heading.as_deref(), Some("Welcome"));
    assert_eq!(home.page.sections[0].text, "Start here.");

    let a = documents.iter().find(|d| d.url().as_url().path() == "/a").unwrap();
    assert_eq!(a.depth, 1);
    assert_eq!(a.page.sections[0].text, "one\ntwo");
}

#[tokio::test]
async fn test_each_url_fetched_once() {
    let links = r#"<a href="/">r</a><a href="/a">a</a><a href="/a/">a2</a><a href="/a#x">a3</a>
                   <a href="/b">b</a><a href="/c?utm_source=x">c</a>"#;
    let transport = Arc::new(
        SiteTransport::new()
            .page("/", links)
            .page("/a", links)
            .page("/b", links)
            .page("/c", links),
    );

    let (documents, failures, summary) =
        collect(start(config(ScrapeMode::RecursiveCrawl), &transport, &["/"])).await;

    assert_eq!(paths(&documents), set(&["/", "/a", "/b", "/c"]));
    assert_eq!(documents.len(), 4);
    assert!(failures.is_empty());
    assert!(transport.all_calls().values().all(|&n| n == 1));
    assert_eq!(transport.total_calls(), 4);
    assert_eq!(summary.stopped_reason, StopReason::FrontierExhausted);
}

#[tokio::test]
async fn test_depth_increases_by_one_per_hop() {
    let transport = Arc::new(
        SiteTransport::new()
            .page("/", r#"<a href="/one">1</a>"#)
            .page("/one", r#"<a href="/two">2</a><a href="/">back</a>"#)
            .page("/two", r#"<a href="/three">3</a>"#)
            .page("/three", r#"<p>end</p>"#),
    );

    let (documents, _, _) =
        collect(start(config(ScrapeMode::RecursiveCrawl), &transport, &["/"])).await;

    let depths: HashMap<String, u32> = documents
        .iter()
        .map(|d| (d.url().as_url().path().to_string(), d.depth))
        .collect();

    assert_eq!(depths["/"], 0);
    assert_eq!(depths["/one"], 1);
    assert_eq!(depths["/two"], 2);
    assert_eq!(depths["/three"], 3);
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let index: String = (0..30).map(|i| format!(r#"<a href="/p{}">p</a>"#, i)).collect();
    let mut site = SiteTransport::new().page("/", &index);
    for i in 0..30 {
        site = site.page(&format!("/p{}", i), "<p>leaf</p>");
    }
    let transport = Arc::new(site.delay(Duration::from_millis(20)));

    let mut config = config(ScrapeMode::RecursiveCrawl);
    config.concurrency_limit = 3;

    let (documents, _, _) = collect(start(config, &transport, &["/"])).await;

    assert_eq!(documents.len(), 31);
    assert!(transport.peak() <= 3, "peak concurrency was {}", transport.peak());
    assert!(transport.peak() >= 1);
}

#[tokio::test]
async fn test_retry_until_success_and_exhaustion() {
    let transport = Arc::new(
        SiteTransport::new()
            .reply(
                "/flaky",
                Reply::Flaky {
                    failures: 2,
                    body: "<p>finally</p>".to_string(),
                },
            )
            .reply("/down", Reply::Status(503))
            .reply("/gone", Reply::Status(404)),
    );

    let mut config = config(ScrapeMode::SinglePage);
    config.retry.max_attempts = 3;

    let (documents, failures, summary) =
        collect(start(config, &transport, &["/flaky", "/down", "/gone"])).await;

    assert_eq!(paths(&documents), set(&["/flaky"]));
    assert_eq!(documents[0].page.sections[0].text, "finally");

    assert_eq!(transport.calls("/flaky"), 3);
    assert_eq!(transport.calls("/down"), 3);
    assert_eq!(transport.calls("/gone"), 1);

    let by_path: HashMap<String, &CrawlFailure> = failures
        .iter()
        .map(|f| (f.url.as_url().path().to_string(), f))
        .collect();
    assert_eq!(by_path.len(), 2);

    match &by_path["/down"].reason {
        FailureReason::Fetch(error) => {
            assert_eq!(error.kind, FetchErrorKind::HttpStatus);
            assert_eq!(error.attempts, 3);
            assert_eq!(error.last_status, Some(503));
        }
        other => panic!("unexpected failure: {:?}", other),
    }
    match &by_path["/gone"].reason {
        FailureReason::Fetch(error) => {
            assert_eq!(error.attempts, 1);
            assert_eq!(error.last_status, Some(404));
        }
        other => panic!("unexpected failure: {:?}", other),
    }

    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(summary.pages_failed, 2);
    assert_eq!(summary.documents_emitted, 1);
}

#[tokio::test]
async fn test_single_page_never_follows_links() {
    let transport = Arc::new(
        SiteTransport::new()
            .page("/", r#"<a href="/a">a</a><a href="/b">b</a>"#)
            .page("/a", "<p>a</p>")
            .page("/b", "<p>b</p>"),
    );

    let (documents, _, summary) =
        collect(start(config(ScrapeMode::SinglePage), &transport, &["/"])).await;

    assert_eq!(paths(&documents), set(&["/"]));
    assert_eq!(transport.total_calls(), 1);
    assert_eq!(summary.stopped_reason, StopReason::FrontierExhausted);
}

fn two_level_site() -> SiteTransport {
    SiteTransport::new()
        .page("/", r#"<a href="/a">A</a><a href="/b">B</a>"#)
        .page("/a", r#"<a href="/c">C</a>"#)
        .page("/b", "<p>b</p>")
        .page("/c", r#"<a href="/d">D</a>"#)
        .page("/d", "<p>d</p>")
}

#[tokio::test]
async fn test_recursive_crawl_max_depth_two() {
    let transport = Arc::new(two_level_site());
    let mut config = config(ScrapeMode::RecursiveCrawl);
    config.max_depth = 2;

    let sink = MemorySink::new();
    let summary = start(config, &transport, &["/"])
        .drain_into(&sink)
        .await
        .unwrap();

    assert_eq!(paths(&sink.take()), set(&["/", "/a", "/b", "/c"]));
    assert_eq!(transport.calls("/d"), 0);
    assert_eq!(summary.documents_emitted, 4);
}

#[tokio::test]
async fn test_recursive_crawl_max_depth_one() {
    let transport = Arc::new(two_level_site());
    let mut config = config(ScrapeMode::RecursiveCrawl);
    config.max_depth = 1;

    let (documents, _, _) = collect(start(config, &transport, &["/"])).await;

    assert_eq!(paths(&documents), set(&["/", "/a", "/b"]));
    assert_eq!(transport.calls("/c"), 0);
}

#[tokio::test]
async fn test_max_pages_cutoff_on_endless_graph() {
    let transport = Arc::new(SiteTransport::new().fallback(endless));
    let mut config = config(ScrapeMode::RecursiveCrawl);
    config.max_depth = 1_000;
    config.max_pages = Some(5);

    let (documents, _, summary) = collect(start(config, &transport, &["/0"])).await;

    assert_eq!(documents.len(), 5);
    assert_eq!(summary.documents_emitted, 5);
    assert_eq!(summary.stopped_reason, StopReason::MaxPagesReached);
}

#[tokio::test]
async fn test_priority_order_stays_shallow_under_page_limit() {
    let transport = Arc::new(SiteTransport::new().fallback(endless));
    let mut config = config(ScrapeMode::RecursiveCrawl);
    config.frontier_order = trace_scraper::FrontierOrder::Priority;
    config.concurrency_limit = 1;
    config.max_depth = 1_000;
    config.max_pages = Some(3);

    let (documents, _, summary) = collect(start(config, &transport, &["/0"])).await;

    let depths: Vec<u32> = documents.iter().map(|d| d.depth).collect();
    assert_eq!(depths, vec![0, 1, 1]);
    assert_eq!(summary.stopped_reason, StopReason::MaxPagesReached);
}

#[tokio::test]
async fn test_cancellation_closes_stream() {
    let transport = Arc::new(
        SiteTransport::new()
            .fallback(endless)
            .delay(Duration::from_millis(100)),
    );
    let mut config = config(ScrapeMode::RecursiveCrawl);
    config.max_depth = 1_000;
    config.timeout_ms = 1_000;

    let mut run = start(config, &transport, &["/0"]);
    let first = run.next().await.expect("at least one document");
    run.cancel();

    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        let mut count = 1;
        while run.next().await.is_some() {
            count += 1;
        }
        count
    })
    .await
    .expect("stream closes within one fetch timeout");

    let summary = run.finish().await.unwrap();
    assert_eq!(first.depth, 0);
    assert_eq!(summary.stopped_reason, StopReason::Cancelled);
    assert_eq!(summary.documents_emitted, drained);
}

#[tokio::test]
async fn test_external_token_cancels_run() {
    let transport = Arc::new(
        SiteTransport::new()
            .fallback(endless)
            .delay(Duration::from_millis(50)),
    );
    let mut config = config(ScrapeMode::RecursiveCrawl);
    config.max_depth = 1_000;
    config.abandon_in_flight_on_cancel = true;

    let token = tokio_util::sync::CancellationToken::new();
    let run = Scraper::new(config, transport.clone())
        .unwrap()
        .run_with_cancellation(&[format!("{}/0", SITE)], token.clone())
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    token.cancel();

    let (_, failures, summary) = tokio::time::timeout(Duration::from_secs(1), collect(run))
        .await
        .expect("abandoned fetches stop promptly");

    assert_eq!(summary.stopped_reason, StopReason::Cancelled);
    // Cancelled fetches are not failures
    assert!(failures.is_empty());
    assert_eq!(summary.pages_failed, 0);
}

#[tokio::test]
async fn test_deadline_stops_run() {
    let transport = Arc::new(
        SiteTransport::new()
            .fallback(endless)
            .delay(Duration::from_millis(50)),
    );
    let mut config = config(ScrapeMode::RecursiveCrawl);
    config.max_depth = 1_000;
    config.concurrency_limit = 2;
    config.deadline_secs = Some(1);

    let (documents, _, summary) = tokio::time::timeout(
        Duration::from_secs(5),
        collect(start(config, &transport, &["/0"])),
    )
    .await
    .expect("deadline ends the run");

    assert!(!documents.is_empty());
    assert_eq!(summary.stopped_reason, StopReason::DeadlineReached);
}

#[tokio::test]
async fn test_sitemap_mode_fetches_leaves_only() {
    let sitemap = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://site.test/a</loc></url>
  <url><loc>https://site.test/b</loc></url>
  <url><loc>https://elsewhere.test/x</loc></url>
</urlset>"#;
    let transport = Arc::new(
        SiteTransport::new()
            .reply("/sitemap.xml", Reply::Xml(sitemap.to_string()))
            .page("/a", r#"<p>a</p><a href="/c">c</a>"#)
            .page("/b", "<p>b</p>")
            .page("/c", "<p>c</p>"),
    );

    let mut config = config(ScrapeMode::Sitemap);
    config.max_depth = 3;

    let (documents, failures, summary) =
        collect(start(config, &transport, &["/sitemap.xml"])).await;

    assert_eq!(paths(&documents), set(&["/a", "/b"]));
    assert!(documents.iter().all(|d| d.depth == 1));
    assert!(documents.iter().all(|d| d.scrape_mode == ScrapeMode::Sitemap));
    assert_eq!(transport.calls("/sitemap.xml"), 1);
    assert_eq!(transport.calls("/c"), 0);
    assert!(failures.is_empty());
    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.documents_emitted, 2);
}

#[tokio::test]
async fn test_extract_failures_are_recorded() {
    let transport = Arc::new(
        SiteTransport::new()
            .page("/", r#"<a href="/feed">feed</a>"#)
            .reply("/feed", Reply::Xml("<rss/>".to_string())),
    );

    let (documents, failures, summary) =
        collect(start(config(ScrapeMode::RecursiveCrawl), &transport, &["/"])).await;

    assert_eq!(paths(&documents), set(&["/"]));
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].reason, FailureReason::Extract(_)));
    assert_eq!(summary.extract_failures, 1);
    assert_eq!(summary.pages_fetched, 2);
}

#[tokio::test]
async fn test_panicking_worker_is_replaced() {
    let transport = Arc::new(
        SiteTransport::new()
            .page("/", r#"<a href="/boom">x</a><a href="/a">a</a><a href="/b">b</a>"#)
            .reply("/boom", Reply::Panic)
            .page("/a", "<p>a</p>")
            .page("/b", "<p>b</p>"),
    );

    let mut config = config(ScrapeMode::RecursiveCrawl);
    config.concurrency_limit = 1;

    let (documents, _, summary) = tokio::time::timeout(
        Duration::from_secs(5),
        collect(start(config, &transport, &["/"])),
    )
    .await
    .expect("run survives a worker panic");

    assert_eq!(paths(&documents), set(&["/", "/a", "/b"]));
    assert_eq!(summary.stopped_reason, StopReason::FrontierExhausted);
}

#[tokio::test]
async fn test_identical_pages_extract_identically() {
    let body = r#"<title>Same</title><h1>H</h1><p>text</p><a href="/z">z</a><a href="/y">y</a>"#;

    let mut pages = Vec::new();
    for _ in 0..2 {
        let transport = Arc::new(SiteTransport::new().page("/", body));
        let (mut documents, _, _) =
            collect(start(config(ScrapeMode::SinglePage), &transport, &["/"])).await;
        pages.push(documents.remove(0).page);
    }

    assert_eq!(pages[0].title, pages[1].title);
    assert_eq!(pages[0].sections, pages[1].sections);
    assert_eq!(pages[0].links, pages[1].links);
}

#[tokio::test]
async fn test_invalid_config_fails_before_any_fetch() {
    let transport = Arc::new(SiteTransport::new().page("/", "<p>x</p>"));

    let mut bad = config(ScrapeMode::RecursiveCrawl);
    bad.rate_limit = 0.0;
    assert!(matches!(
        Scraper::new(bad, transport.clone()),
        Err(ConfigError::Validation(_))
    ));

    let mut bad = config(ScrapeMode::Sitemap);
    bad.max_depth = 0;
    assert!(Scraper::new(bad, transport.clone()).is_err());

    let scraper = Scraper::new(config(ScrapeMode::SinglePage), transport.clone()).unwrap();
    let no_seeds: [&str; 0] = [];
    assert!(matches!(scraper.run(&no_seeds), Err(ScraperError::Config(_))));

    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_json_lines_output() {
    let transport = Arc::new(two_level_site());
    let sink = JsonLinesSink::new(Vec::new());

    let summary = start(config(ScrapeMode::RecursiveCrawl), &transport, &["/"])
        .drain_into(&sink)
        .await
        .unwrap();

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let urls: BTreeSet<String> = output
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["page"]["url"].as_str().unwrap().to_string()
        })
        .collect();

    assert_eq!(urls.len(), summary.documents_emitted);
    assert!(urls.contains("https://site.test/"));
    assert!(urls.contains("https://site.test/d"));
}
