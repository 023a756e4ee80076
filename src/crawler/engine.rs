//! Scraper engine - run orchestration
//!
//! A run is a fixed pool of workers sharing one [`Frontier`], one [`Fetcher`]
//! and one [`RunState`]. Each worker loops:
//!
//! 1. Check the global stop conditions (max pages, deadline, cancellation)
//! 2. Take the next entry from the frontier
//! 3. Fetch it; record failures and continue
//! 4. Extract it; record failures and continue
//! 5. Offer the mode controller's planned entries back to the frontier
//! 6. Reserve an emission slot and send the `Document` to the consumer
//!
//! A supervisor task owns the workers, fires the deadline timer, reacts to
//! cancellation and replaces workers that panic. Documents flow through a
//! bounded channel, so a slow consumer throttles the whole run.

use crate::config::{validate_scraper_config, validate_seeds, ScraperConfig, UserAgentConfig};
use crate::crawler::extractor::{extract, extract_sitemap, ExtractError};
use crate::crawler::fetcher::{FetchError, FetchErrorKind, Fetcher};
use crate::crawler::frontier::{Claim, Frontier};
use crate::crawler::mode::{emits, is_sitemap_phase, plan, LinkPolicy};
use crate::crawler::transport::{HttpTransport, Transport};
use crate::document::{Document, ScrapedPage};
use crate::output::DocumentSink;
use crate::state::{RunState, RunSummary, StopReason};
use crate::url::{DomainFilter, NormalizedUrl};
use crate::{ConfigError, Result};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

/// Why a URL produced no document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("fetch failed: {0}")]
    Fetch(FetchError),

    #[error("extraction failed: {0}")]
    Extract(ExtractError),
}

/// A per-URL failure reported on the run's side channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlFailure {
    pub url: NormalizedUrl,
    pub depth: u32,
    pub reason: FailureReason,
}

/// Configured scraper, ready to start one run
pub struct Scraper {
    config: Arc<ScraperConfig>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Scraper {
    /// Creates a scraper over the given transport
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid. No request is
    /// made before the configuration has been accepted.
    pub fn new(
        config: ScraperConfig,
        transport: Arc<dyn Transport>,
    ) -> std::result::Result<Self, ConfigError> {
        validate_scraper_config(&config)?;

        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    /// Creates a scraper over the `reqwest` transport
    pub fn with_http(config: ScraperConfig, user_agent: &UserAgentConfig) -> Result<Self> {
        let transport = HttpTransport::new(user_agent)?;
        Ok(Self::new(config, Arc::new(transport))?)
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Starts a run from `seeds`
    ///
    /// Must be called from within a Tokio runtime. Dropping the returned
    /// [`ScrapeRun`] cancels the run.
    pub fn run<S: AsRef<str>>(self, seeds: &[S]) -> Result<ScrapeRun> {
        self.run_with_cancellation(seeds, CancellationToken::new())
    }

    /// Starts a run that also stops when `cancel` is triggered
    pub fn run_with_cancellation<S: AsRef<str>>(
        self,
        seeds: &[S],
        cancel: CancellationToken,
    ) -> Result<ScrapeRun> {
        validate_seeds(seeds)?;
        let seeds = seeds
            .iter()
            .map(|s| NormalizedUrl::parse(s.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let config = self.config;
        let run_id = Uuid::new_v4().to_string();
        let seed_urls: Vec<_> = seeds.iter().map(|s| s.as_url().clone()).collect();
        let filter = DomainFilter::for_run(&config.allowed_domains, &seed_urls);

        let frontier = Frontier::new(config.frontier_order, config.max_depth, filter.clone());
        for seed in seeds {
            if !frontier.offer_seed(seed.clone()) {
                tracing::warn!("Seed {} skipped (duplicate or outside allowed domains)", seed);
            }
        }

        let state = Arc::new(RunState::new());
        let fetcher = Fetcher::new(&config, self.transport, state.clone(), cancel.clone())?;
        let (documents_tx, documents_rx) = mpsc::channel(config.output_buffer);
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        tracing::info!(
            "Starting run {} ({} mode, {} seed(s), {} workers)",
            run_id,
            config.mode,
            frontier.pending(),
            config.concurrency_limit
        );

        let context = Arc::new(RunContext {
            run_id: run_id.clone(),
            policy: LinkPolicy::new(config.max_depth, filter),
            config,
            frontier,
            fetcher,
            state,
            documents: documents_tx,
            failures: failures_tx,
            cancel: cancel.clone(),
        });

        let supervisor = tokio::spawn(supervise(context));

        Ok(ScrapeRun {
            run_id,
            documents: documents_rx,
            failures: failures_rx,
            cancel: cancel.clone(),
            supervisor,
            cancel_on_drop: cancel.drop_guard(),
        })
    }
}

/// Handle to a running scrape
///
/// The run is finite and cannot be restarted. Documents arrive in no
/// particular order.
pub struct ScrapeRun {
    run_id: String,
    documents: mpsc::Receiver<Document>,
    failures: mpsc::UnboundedReceiver<CrawlFailure>,
    cancel: CancellationToken,
    supervisor: JoinHandle<RunSummary>,
    cancel_on_drop: DropGuard,
}

impl std::fmt::Debug for ScrapeRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeRun")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl ScrapeRun {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Waits for the next document; `None` once the run has ended
    pub async fn next(&mut self) -> Option<Document> {
        self.documents.recv().await
    }

    /// Drains the failures reported so far
    pub fn take_failures(&mut self) -> Vec<CrawlFailure> {
        let mut failures = Vec::new();
        while let Ok(failure) = self.failures.try_recv() {
            failures.push(failure);
        }
        failures
    }

    /// Requests cancellation; the document stream closes once in-flight work stops
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the run to end and returns its summary
    ///
    /// Documents not yet received are discarded. A run still producing
    /// documents stops as `Cancelled` at its next emission.
    pub async fn finish(self) -> Result<RunSummary> {
        let ScrapeRun {
            documents,
            supervisor,
            cancel_on_drop,
            ..
        } = self;

        drop(documents);
        let summary = supervisor.await?;
        cancel_on_drop.disarm();
        Ok(summary)
    }

    /// Feeds every document to `sink`, then returns the summary
    ///
    /// A sink error cancels the run and is returned once it has stopped.
    pub async fn drain_into<K>(mut self, sink: &K) -> Result<RunSummary>
    where
        K: DocumentSink + ?Sized,
    {
        while let Some(document) = self.next().await {
            if let Err(e) = sink.accept(document).await {
                tracing::error!("Sink rejected document, cancelling run {}: {}", self.run_id, e);
                self.cancel();
                self.finish().await?;
                return Err(e.into());
            }
        }

        self.finish().await
    }
}

/// Everything a worker needs, scoped to one run
struct RunContext {
    run_id: String,
    config: Arc<ScraperConfig>,
    frontier: Frontier,
    fetcher: Fetcher,
    policy: LinkPolicy,
    state: Arc<RunState>,
    documents: mpsc::Sender<Document>,
    failures: mpsc::UnboundedSender<CrawlFailure>,
    cancel: CancellationToken,
}

impl RunContext {
    /// Records the stop reason (first one wins) and closes the frontier
    fn stop(&self, reason: StopReason) {
        if self.state.set_stop_reason(reason) {
            tracing::info!("Stopping run {}: {}", self.run_id, reason);
        }
        self.frontier.close();
    }

    /// Checks the global stop conditions before taking more work
    fn should_stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            self.stop(StopReason::Cancelled);
            return true;
        }

        if let Some(max) = self.config.max_pages {
            if self.state.documents_emitted() >= max {
                self.stop(StopReason::MaxPagesReached);
                return true;
            }
        }

        if let Some(deadline) = self.config.deadline() {
            if self.state.elapsed() >= deadline {
                self.stop(StopReason::DeadlineReached);
                return true;
            }
        }

        self.state.is_stopping()
    }

    fn report(&self, claim: &Claim, reason: FailureReason) {
        // Nobody listening is fine
        let _ = self.failures.send(CrawlFailure {
            url: claim.url.clone(),
            depth: claim.depth,
            reason,
        });
    }

    /// Runs one claimed entry through fetch, extract, plan and emit
    async fn process(&self, claim: &Claim) {
        let mode = self.config.mode;
        let depth = claim.depth;

        let result = self.fetcher.fetch(&claim.url).await;
        if let Some(error) = &result.error {
            if error.kind != FetchErrorKind::Cancelled {
                self.report(claim, FailureReason::Fetch(error.clone()));
            }
            return;
        }

        if self.cancel.is_cancelled() {
            return;
        }

        let extracted = if is_sitemap_phase(mode, depth) {
            extract_sitemap(&result)
        } else {
            extract(&result)
        };

        let page = match extracted {
            Ok(page) => page,
            Err(e) => {
                self.state.record_extract_failure();
                tracing::warn!("Failed to extract {}: {}", claim.url, e);
                self.report(claim, FailureReason::Extract(e));
                return;
            }
        };

        let planned = plan(mode, &page, depth, &self.policy);
        let offered = planned.len();
        let admitted = planned
            .into_iter()
            .filter(|entry| {
                self.frontier
                    .offer(entry.url.clone(), entry.depth, entry.origin.clone())
            })
            .count();

        tracing::debug!(
            "Processed {} at depth {}: {} section(s), {}/{} link(s) admitted",
            claim.url,
            depth,
            page.sections.len(),
            admitted,
            offered
        );

        if emits(mode, depth) {
            self.emit(page, depth).await;
        }
    }

    async fn emit(&self, page: ScrapedPage, depth: u32) {
        let max_pages = self.config.max_pages;
        let Some(slot) = self.state.try_reserve_emission(max_pages) else {
            tracing::debug!("Dropping {}: page limit reached", page.url);
            return;
        };

        let last_slot = max_pages == Some(slot);
        if last_slot {
            self.frontier.close();
        }

        let document = Document {
            page,
            depth,
            scrape_mode: self.config.mode,
            run_id: self.run_id.clone(),
        };

        let delivered = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.documents.send(document) => sent.is_ok(),
        };

        if !delivered {
            self.state.release_emission();
            if !self.cancel.is_cancelled() {
                tracing::debug!("Document consumer went away, stopping run {}", self.run_id);
            }
            self.stop(StopReason::Cancelled);
            return;
        }

        if last_slot {
            self.stop(StopReason::MaxPagesReached);
        }

        if slot % 10 == 0 {
            let elapsed = self.state.elapsed();
            tracing::info!(
                "Progress: {} documents emitted, {} pending, {} in flight, {:.2} pages/sec",
                slot,
                self.frontier.pending(),
                self.frontier.in_flight(),
                self.state.pages_fetched() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
            );
        }
    }
}

async fn worker(context: Arc<RunContext>, worker_id: usize) {
    tracing::trace!("Worker {} started", worker_id);

    loop {
        if context.should_stop() {
            break;
        }

        let claim = tokio::select! {
            _ = context.cancel.cancelled() => break,
            claim = context.frontier.take() => match claim {
                Some(claim) => claim,
                None => break,
            },
        };

        context.process(&claim).await;
    }

    tracing::trace!("Worker {} finished", worker_id);
}

/// Owns the worker pool until every worker has exited
async fn supervise(context: Arc<RunContext>) -> RunSummary {
    let mut workers = JoinSet::new();
    let mut next_worker_id = 0usize;
    for _ in 0..context.config.concurrency_limit {
        workers.spawn(worker(context.clone(), next_worker_id));
        next_worker_id += 1;
    }

    let deadline = context
        .config
        .deadline()
        .and_then(|d| context.state.started_at().checked_add(d));
    // A deadline past the clock's range never fires
    let deadline_timer = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline_timer);

    let mut deadline_fired = false;
    let mut cancel_seen = false;

    loop {
        tokio::select! {
            _ = &mut deadline_timer, if !deadline_fired => {
                deadline_fired = true;
                context.stop(StopReason::DeadlineReached);
            }
            _ = context.cancel.cancelled(), if !cancel_seen => {
                cancel_seen = true;
                context.stop(StopReason::Cancelled);
            }
            joined = workers.join_next() => match joined {
                None => break,
                Some(Ok(())) => {}
                Some(Err(e)) if e.is_panic() => {
                    tracing::error!("Worker panicked in run {}: {}", context.run_id, e);
                    if !context.state.is_stopping() && !context.frontier.is_closed() {
                        workers.spawn(worker(context.clone(), next_worker_id));
                        next_worker_id += 1;
                    }
                }
                Some(Err(e)) => tracing::warn!("Worker ended abnormally: {}", e),
            },
        }
    }

    context.state.set_stop_reason(StopReason::FrontierExhausted);
    let summary = context.state.summary(&context.run_id);
    tracing::info!(
        "Run {} finished ({}): {} documents, {} fetched, {} failed, {} extract failures, {} URLs discovered in {:?}",
        summary.run_id,
        summary.stopped_reason,
        summary.documents_emitted,
        summary.pages_fetched,
        summary.pages_failed,
        summary.extract_failures,
        context.frontier.seen_count(),
        summary.duration
    );
    summary
}
