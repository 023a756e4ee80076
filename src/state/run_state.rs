use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// Every reachable URL was processed
    FrontierExhausted,
    /// The run emitted `max_pages` documents
    MaxPagesReached,
    /// The run exceeded its deadline
    DeadlineReached,
    /// The caller cancelled the run (or stopped consuming it)
    Cancelled,
}

impl StopReason {
    fn to_code(self) -> u8 {
        match self {
            Self::FrontierExhausted => 1,
            Self::MaxPagesReached => 2,
            Self::DeadlineReached => 3,
            Self::Cancelled => 4,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::FrontierExhausted),
            2 => Some(Self::MaxPagesReached),
            3 => Some(Self::DeadlineReached),
            4 => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::FrontierExhausted => "frontier exhausted",
            Self::MaxPagesReached => "max pages reached",
            Self::DeadlineReached => "deadline reached",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Mutable per-run counters shared by every worker of one run
///
/// All updates are single atomic operations; there is no global instance,
/// each run owns its own `RunState`.
#[derive(Debug)]
pub struct RunState {
    pages_fetched: AtomicU64,
    pages_failed: AtomicU64,
    extract_failures: AtomicU64,
    documents_emitted: AtomicUsize,
    stop_reason: AtomicU8,
    started_at: Instant,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            pages_fetched: AtomicU64::new(0),
            pages_failed: AtomicU64::new(0),
            extract_failures: AtomicU64::new(0),
            documents_emitted: AtomicUsize::new(0),
            stop_reason: AtomicU8::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.pages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_extract_failure(&self) {
        self.extract_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched.load(Ordering::Relaxed)
    }

    pub fn pages_failed(&self) -> u64 {
        self.pages_failed.load(Ordering::Relaxed)
    }

    pub fn extract_failures(&self) -> u64 {
        self.extract_failures.load(Ordering::Relaxed)
    }

    pub fn documents_emitted(&self) -> usize {
        self.documents_emitted.load(Ordering::Acquire)
    }

    /// Reserves one emission slot under an optional cap
    ///
    /// Returns the 1-based slot number, or `None` once `limit` slots are taken.
    /// Concurrent callers never over-reserve.
    pub fn try_reserve_emission(&self, limit: Option<usize>) -> Option<usize> {
        self.documents_emitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match limit {
                Some(max) if n >= max => None,
                _ => Some(n + 1),
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Gives back a reserved slot whose document could not be delivered
    pub fn release_emission(&self) {
        self.documents_emitted.fetch_sub(1, Ordering::AcqRel);
    }

    /// Records why the run stops; the first reason wins
    ///
    /// Returns true if this call set the reason.
    pub fn set_stop_reason(&self, reason: StopReason) -> bool {
        self.stop_reason
            .compare_exchange(0, reason.to_code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        StopReason::from_code(self.stop_reason.load(Ordering::Acquire))
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_reason().is_some()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Snapshots the counters into a summary
    pub fn summary(&self, run_id: &str) -> RunSummary {
        RunSummary {
            run_id: run_id.to_string(),
            pages_fetched: self.pages_fetched(),
            pages_failed: self.pages_failed(),
            extract_failures: self.extract_failures(),
            documents_emitted: self.documents_emitted(),
            duration: self.elapsed(),
            stopped_reason: self.stop_reason().unwrap_or(StopReason::FrontierExhausted),
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Final statistics of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub pages_fetched: u64,
    pub pages_failed: u64,
    pub extract_failures: u64,
    pub documents_emitted: usize,
    pub duration: Duration,
    pub stopped_reason: StopReason,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters() {
        let state = RunState::new();
        state.record_fetched();
        state.record_fetched();
        state.record_failed();
        state.record_extract_failure();

        assert_eq!(state.pages_fetched(), 2);
        assert_eq!(state.pages_failed(), 1);
        assert_eq!(state.extract_failures(), 1);
    }

    #[test]
    fn test_first_stop_reason_wins() {
        let state = RunState::new();
        assert!(state.stop_reason().is_none());

        assert!(state.set_stop_reason(StopReason::MaxPagesReached));
        assert!(!state.set_stop_reason(StopReason::Cancelled));
        assert_eq!(state.stop_reason(), Some(StopReason::MaxPagesReached));
    }

    #[test]
    fn test_summary_defaults_to_exhausted() {
        let state = RunState::new();
        let summary = state.summary("run-1");
        assert_eq!(summary.run_id, "run-1");
        assert_eq!(summary.stopped_reason, StopReason::FrontierExhausted);
    }

    #[test]
    fn test_emission_cap_under_contention() {
        let state = Arc::new(RunState::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|_| state.try_reserve_emission(Some(50)).is_some())
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
        assert_eq!(state.documents_emitted(), 50);
    }

    #[test]
    fn test_release_emission() {
        let state = RunState::new();
        assert_eq!(state.try_reserve_emission(Some(1)), Some(1));
        assert_eq!(state.try_reserve_emission(Some(1)), None);
        state.release_emission();
        assert_eq!(state.try_reserve_emission(Some(1)), Some(1));
    }
}
