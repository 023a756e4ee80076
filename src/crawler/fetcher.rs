//! Bounded-concurrency fetcher
//!
//! This module wraps the [`Transport`] capability with:
//! - A run-wide semaphore capping simultaneous transport calls
//! - Per-host token buckets for politeness
//! - A per-attempt timeout
//! - Retry with exponential backoff and jitter
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 2xx | Success |
//! | HTTP 429, 5xx (default set) | Retry with backoff |
//! | Other HTTP status | Immediate failure |
//! | Timeout | Retry with backoff |
//! | Connection/transport error | Retry with backoff |
//!
//! Exhausting `max_attempts` yields a [`FetchResult`] carrying a [`FetchError`]
//! and no body.

use crate::config::{RetryPolicy, ScraperConfig};
use crate::crawler::retry::{AttemptOutcome, RetryDecision};
use crate::crawler::transport::{Transport, TransportError, TransportResponse};
use crate::state::{HostState, RunState};
use crate::url::NormalizedUrl;
use crate::ConfigError;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Category of a terminal fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The last attempt timed out
    Timeout,
    /// The last attempt returned a non-2xx status
    HttpStatus,
    /// The last attempt failed at the connection level
    Transport,
    /// The run was cancelled before the fetch completed
    Cancelled,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::HttpStatus => "http status",
            Self::Transport => "transport",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal per-URL failure after retries are exhausted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub attempts: u32,
    pub last_status: Option<u16>,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure after {} attempt(s)", self.kind, self.attempts)?;
        if let Some(status) = self.last_status {
            write!(f, " (last status {})", status)?;
        }
        Ok(())
    }
}

/// Outcome of fetching one URL
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The URL that was requested
    pub url: NormalizedUrl,
    /// Where the body was actually served from (after redirects)
    pub final_url: Url,
    /// Status of the last attempt, if any response arrived
    pub status: Option<u16>,
    pub headers: HeaderMap,
    /// Body bytes; empty whenever `error` is set
    pub body: Vec<u8>,
    /// Time spent across all attempts, backoff included
    pub elapsed: Duration,
    pub attempts: u32,
    /// When the fetch completed
    pub fetched_at: DateTime<Utc>,
    pub error: Option<FetchError>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Content-Type header, if present and readable
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Builds a successful result from a raw response
    pub fn from_response(
        url: NormalizedUrl,
        response: TransportResponse,
        elapsed: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            url,
            final_url: response.final_url,
            status: Some(response.status),
            headers: response.headers,
            body: response.body,
            elapsed,
            attempts,
            fetched_at: Utc::now(),
            error: None,
        }
    }

    fn failed(url: NormalizedUrl, elapsed: Duration, error: FetchError) -> Self {
        Self {
            final_url: url.as_url().clone(),
            url,
            status: error.last_status,
            headers: HeaderMap::new(),
            body: Vec::new(),
            elapsed,
            attempts: error.attempts,
            fetched_at: Utc::now(),
            error: Some(error),
        }
    }
}

/// Per-host token buckets shared by every worker of a run
#[derive(Debug)]
pub struct HostRateLimiter {
    rate: f64,
    burst: u32,
    hosts: Mutex<HashMap<String, HostState>>,
}

impl HostRateLimiter {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Non-blocking token acquisition; returns the wait on refusal
    pub fn try_acquire(&self, host: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(self.burst, now))
            .try_acquire(self.rate, self.burst, now)
    }

    /// Waits until a token for `host` is available
    ///
    /// Returns false if `cancel` fired first. The lock is never held while
    /// sleeping.
    pub async fn acquire(&self, host: &str, cancel: &CancellationToken) -> bool {
        loop {
            let wait = match self.try_acquire(host) {
                Ok(()) => return true,
                Err(wait) => wait,
            };

            tracing::trace!("Host {} throttled for {:?}", host, wait);
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Number of requests admitted so far for `host`
    pub fn request_count(&self, host: &str) -> u64 {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.get(host).map(|s| s.request_count).unwrap_or(0)
    }
}

/// Bounded-concurrency, polite, retrying wrapper around a transport
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    limiter: HostRateLimiter,
    retry: RetryPolicy,
    timeout: Duration,
    headers: HeaderMap,
    run_state: Arc<RunState>,
    cancel: CancellationToken,
    abandon_in_flight: bool,
}

impl Fetcher {
    /// Creates a fetcher for one run
    ///
    /// Fails if a configured header name or value is not valid HTTP.
    pub fn new(
        config: &ScraperConfig,
        transport: Arc<dyn Transport>,
        run_state: Arc<RunState>,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            transport,
            permits: Arc::new(Semaphore::new(config.concurrency_limit)),
            limiter: HostRateLimiter::new(config.rate_limit, config.rate_limit_burst),
            retry: config.retry.clone(),
            timeout: config.timeout(),
            headers: config.header_map()?,
            run_state,
            cancel,
            abandon_in_flight: config.abandon_in_flight_on_cancel,
        })
    }

    /// Fetches `url`, retrying per policy
    ///
    /// Never returns an `Err`: terminal failures are reported in
    /// [`FetchResult::error`]. Increments the run's fetched or failed counter,
    /// except for fetches cut short by cancellation.
    pub async fn fetch(&self, url: &NormalizedUrl) -> FetchResult {
        let started = Instant::now();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let outcome = match self.attempt(url).await {
                Some(outcome) => outcome,
                None => return self.cancelled(url, started, attempt),
            };

            let (decision, kind, status) = match &outcome {
                Ok(response) => (
                    self.retry.classify(AttemptOutcome::Status(response.status)),
                    FetchErrorKind::HttpStatus,
                    Some(response.status),
                ),
                Err(TransportError::Timeout { .. }) => (
                    self.retry.classify(AttemptOutcome::Timeout),
                    FetchErrorKind::Timeout,
                    None,
                ),
                Err(_) => (
                    self.retry.classify(AttemptOutcome::Transport),
                    FetchErrorKind::Transport,
                    None,
                ),
            };

            match (decision, outcome) {
                (RetryDecision::Success, Ok(response)) => {
                    self.run_state.record_fetched();
                    tracing::debug!(
                        "Fetched {} ({}) in {} attempt(s)",
                        url,
                        response.status,
                        attempt
                    );
                    return FetchResult::from_response(
                        url.clone(),
                        response,
                        started.elapsed(),
                        attempt,
                    );
                }
                (RetryDecision::Retry, outcome) if attempt < max_attempts => {
                    let delay = self
                        .retry
                        .backoff_with_jitter(attempt - 1, &mut rand::thread_rng());
                    match &outcome {
                        Ok(response) => tracing::debug!(
                            "Attempt {} for {} returned {}, retrying in {:?}",
                            attempt,
                            url,
                            response.status,
                            delay
                        ),
                        Err(e) => tracing::debug!(
                            "Attempt {} for {} failed ({}), retrying in {:?}",
                            attempt,
                            url,
                            e,
                            delay
                        ),
                    }

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return self.cancelled(url, started, attempt);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                _ => {
                    let error = FetchError {
                        kind,
                        attempts: attempt,
                        last_status: status,
                    };
                    self.run_state.record_failed();
                    tracing::warn!("Giving up on {}: {}", url, error);
                    return FetchResult::failed(url.clone(), started.elapsed(), error);
                }
            }
        }
    }

    /// Runs one attempt holding a host token and a concurrency permit
    ///
    /// The host token is taken first so a throttled host never occupies a
    /// permit. Returns `None` if the run was cancelled while waiting (or
    /// mid-call when in-flight work is abandoned).
    async fn attempt(
        &self,
        url: &NormalizedUrl,
    ) -> Option<Result<TransportResponse, TransportError>> {
        if !self.limiter.acquire(url.host(), &self.cancel).await {
            return None;
        }

        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            permit = self.permits.acquire() => permit.ok()?,
        };

        let call = tokio::time::timeout(
            self.timeout,
            self.transport.fetch(url.as_url(), &self.headers, self.timeout),
        );

        let result = if self.abandon_in_flight {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                result = call => result,
            }
        } else {
            call.await
        };

        Some(result.unwrap_or_else(|_| {
            Err(TransportError::Timeout {
                url: url.to_string(),
            })
        }))
    }

    fn cancelled(&self, url: &NormalizedUrl, started: Instant, attempts: u32) -> FetchResult {
        tracing::debug!("Fetch of {} cancelled", url);
        FetchResult::failed(
            url.clone(),
            started.elapsed(),
            FetchError {
                kind: FetchErrorKind::Cancelled,
                attempts,
                last_status: None,
            },
        )
    }
}
