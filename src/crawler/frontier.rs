//! URL frontier: deduplicating work queue shared by the worker pool
//!
//! The seen-set, the pending queue, the in-flight count and the closed flag
//! live behind a single mutex so that dedup-check-and-insert is one atomic
//! step. The mutex is never held across an `.await`; waiting workers park on
//! a [`Notify`] instead.

use crate::config::FrontierOrder;
use crate::url::{DomainFilter, NormalizedUrl};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// A unit of pending work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: NormalizedUrl,
    /// Link-following hops from the nearest seed
    pub depth: u32,
    /// Page the link was discovered on; `None` for seeds
    pub origin: Option<NormalizedUrl>,
}

impl FrontierEntry {
    pub fn seed(url: NormalizedUrl) -> Self {
        Self {
            url,
            depth: 0,
            origin: None,
        }
    }
}

/// Entry wrapper ordering the priority queue by `(depth, discovery sequence)`
#[derive(Debug)]
struct Prioritized {
    sequence: u64,
    entry: FrontierEntry,
}

// BinaryHeap is a max-heap: reverse so the shallowest, oldest entry pops first
impl Ord for Prioritized {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .entry
            .depth
            .cmp(&self.entry.depth)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Prioritized {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Prioritized {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for Prioritized {}

#[derive(Debug)]
enum PendingQueue {
    Fifo(VecDeque<FrontierEntry>),
    Priority(BinaryHeap<Prioritized>),
}

impl PendingQueue {
    fn new(order: FrontierOrder) -> Self {
        match order {
            FrontierOrder::Fifo => Self::Fifo(VecDeque::new()),
            FrontierOrder::Priority => Self::Priority(BinaryHeap::new()),
        }
    }

    fn push(&mut self, entry: FrontierEntry, sequence: u64) {
        match self {
            Self::Fifo(queue) => queue.push_back(entry),
            Self::Priority(heap) => heap.push(Prioritized { sequence, entry }),
        }
    }

    fn pop(&mut self) -> Option<FrontierEntry> {
        match self {
            Self::Fifo(queue) => queue.pop_front(),
            Self::Priority(heap) => heap.pop().map(|p| p.entry),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Fifo(queue) => queue.len(),
            Self::Priority(heap) => heap.len(),
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Fifo(queue) => queue.clear(),
            Self::Priority(heap) => heap.clear(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    seen: HashSet<NormalizedUrl>,
    queue: PendingQueue,
    in_flight: usize,
    next_sequence: u64,
    closed: bool,
    exhausted: bool,
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
    notify: Notify,
    max_depth: u32,
    filter: DomainFilter,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe seen-set plus pending-work queue
///
/// Cloning yields another handle to the same frontier.
#[derive(Debug, Clone)]
pub struct Frontier {
    shared: Arc<Shared>,
}

/// A taken entry that is still being processed
///
/// While any claim is alive the frontier cannot be exhausted, because the
/// claimed page may still offer new links. Dropping the claim (also during a
/// panic unwind) releases it.
#[derive(Debug)]
pub struct Claim {
    entry: FrontierEntry,
    frontier: Frontier,
}

impl Claim {
    pub fn entry(&self) -> &FrontierEntry {
        &self.entry
    }
}

impl std::ops::Deref for Claim {
    type Target = FrontierEntry;

    fn deref(&self) -> &FrontierEntry {
        &self.entry
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.frontier.release();
    }
}

impl Frontier {
    pub fn new(order: FrontierOrder, max_depth: u32, filter: DomainFilter) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    seen: HashSet::new(),
                    queue: PendingQueue::new(order),
                    in_flight: 0,
                    next_sequence: 0,
                    closed: false,
                    exhausted: false,
                }),
                notify: Notify::new(),
                max_depth,
                filter,
            }),
        }
    }

    /// Offers a URL for processing
    ///
    /// # Returns
    ///
    /// `true` if the URL was newly admitted; `false` if it was already seen,
    /// is outside the domain filter, exceeds `max_depth`, or the frontier is
    /// closed.
    pub fn offer(&self, url: NormalizedUrl, depth: u32, origin: Option<NormalizedUrl>) -> bool {
        if depth > self.shared.max_depth || !self.shared.filter.allows(url.as_url()) {
            return false;
        }

        {
            let mut inner = self.shared.lock();
            if inner.closed || inner.seen.contains(&url) {
                return false;
            }
            inner.seen.insert(url.clone());
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            inner.queue.push(FrontierEntry { url, depth, origin }, sequence);
        }

        self.shared.notify.notify_one();
        true
    }

    /// Offers a seed at depth 0
    pub fn offer_seed(&self, url: NormalizedUrl) -> bool {
        self.offer(url, 0, None)
    }

    /// Takes the next entry, waiting until one is available
    ///
    /// Returns `None` once the frontier is closed, or once it is exhausted:
    /// the queue is empty and no claim is outstanding, so no more work can
    /// ever arrive.
    pub async fn take(&self) -> Option<Claim> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.shared.lock();
                if inner.closed {
                    return None;
                }
                if let Some(entry) = inner.queue.pop() {
                    inner.in_flight += 1;
                    return Some(Claim {
                        entry,
                        frontier: self.clone(),
                    });
                }
                if inner.in_flight == 0 {
                    inner.exhausted = true;
                    inner.closed = true;
                    drop(inner);
                    tracing::debug!("Frontier exhausted");
                    self.shared.notify.notify_waiters();
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stops the frontier: later offers fail and every waiting `take` returns
    pub fn close(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.queue.clear();
        }
        self.shared.notify.notify_waiters();
    }

    fn release(&self) {
        let wake_all = {
            let mut inner = self.shared.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
            if inner.in_flight == 0 && inner.queue.len() == 0 && !inner.closed {
                inner.exhausted = true;
                inner.closed = true;
                true
            } else {
                false
            }
        };

        if wake_all {
            tracing::debug!("Frontier exhausted");
            self.shared.notify.notify_waiters();
        }
    }

    /// True once the frontier ran out of work on its own (not via `close`)
    pub fn is_exhausted(&self) -> bool {
        self.shared.lock().exhausted
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of entries waiting to be taken
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Number of claims currently outstanding
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    /// Number of distinct URLs ever admitted
    pub fn seen_count(&self) -> usize {
        self.shared.lock().seen.len()
    }
}
