//! Synchronized member cache.
//!
//! Holds the single authoritative snapshot of the member collection and replaces
//! it wholesale on every successful refetch. Refetches are coalesced: while one
//! fetch is in flight, every further request joins it and observes the same
//! outcome. A failed refetch keeps the previous snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::gateway::MemberSource;
use crate::errors::DirectoryError;
use crate::models::Member;

/// Ordered, immutable collection of members as fetched at one point in time.
pub type Snapshot = Arc<[Member]>;

/// Result of one refetch, shared by everyone who waited on it.
pub type RefreshOutcome = Result<Snapshot, Arc<DirectoryError>>;

/// A refetch that may be awaited by any number of callers.
pub type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Whether the cache holds data, and whether the last refetch worked.
#[derive(Debug, Clone)]
pub enum LoadState {
    /// No fetch has completed yet.
    Pending,
    /// The snapshot reflects the last fetch.
    Ready { fetched_at: DateTime<Utc> },
    /// The last fetch failed; the snapshot is whatever was loaded before.
    Failed { error: Arc<DirectoryError> },
}

impl LoadState {
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed { .. })
    }
}

/// Notifications for cache observers.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A new snapshot replaced the previous one.
    Replaced { generation: u64, len: usize },
    /// A refetch failed and the previous snapshot was kept.
    RefreshFailed { error: Arc<DirectoryError> },
}

/// Why an invalidation was requested. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    Initial,
    Manual,
    ChangeFeed,
}

/// Message-passing handle into a cache's invalidation entry point.
#[derive(Debug, Clone)]
pub struct Invalidator {
    tx: mpsc::UnboundedSender<InvalidationReason>,
}

impl Invalidator {
    /// A connected invalidator/receiver pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InvalidationReason>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ask for a refetch. Returns `false` once the cache is gone.
    pub fn request(&self, reason: InvalidationReason) -> bool {
        self.tx.send(reason).is_ok()
    }
}

struct CacheState {
    snapshot: Snapshot,
    load: LoadState,
    generation: u64,
}

struct CacheInner {
    source: Arc<dyn MemberSource>,
    state: RwLock<CacheState>,
    /// The fetch currently running, if any. Also serializes publication of a
    /// result against admission of the next fetch.
    in_flight: Mutex<Option<PendingRefresh>>,
    fetches: AtomicU64,
    events: broadcast::Sender<CacheEvent>,
    invalidator: Invalidator,
}

/// Cheaply cloneable handle to the synchronized member cache.
#[derive(Clone)]
pub struct MemberCache {
    inner: Arc<CacheInner>,
}

impl MemberCache {
    /// Create an empty cache over `source`.
    ///
    /// Must be called from within a Tokio runtime: it spawns the task that
    /// drains [`Invalidator`] messages. That task stops when the last handle is
    /// dropped.
    pub fn new(source: Arc<dyn MemberSource>) -> Self {
        let (invalidator, mut requests) = Invalidator::channel();
        let (events, _) = broadcast::channel(64);

        let inner = Arc::new(CacheInner {
            source,
            state: RwLock::new(CacheState {
                snapshot: Arc::from(Vec::<Member>::new()),
                load: LoadState::Pending,
                generation: 0,
            }),
            in_flight: Mutex::new(None),
            fetches: AtomicU64::new(0),
            events,
            invalidator,
        });

        let weak: Weak<CacheInner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(reason) = requests.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                debug!(?reason, "Invalidation requested");
                // Fire and forget: the fetch runs in its own task.
                drop(MemberCache { inner }.request_refresh());
            }
        });

        Self { inner }
    }

    /// Current snapshot. Empty until the first fetch resolves.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.inner.state.read().snapshot)
    }

    pub fn load_state(&self) -> LoadState {
        self.inner.state.read().load.clone()
    }

    /// Number of successful snapshot replacements so far.
    pub fn generation(&self) -> u64 {
        self.inner.state.read().generation
    }

    /// Number of fetches issued against the source so far.
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Handle that requests invalidation through the cache's message channel.
    pub fn invalidator(&self) -> Invalidator {
        self.inner.invalidator.clone()
    }

    /// Subscribe to snapshot replacements and refresh failures.
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Refetch and wait for the outcome, joining a fetch already in flight.
    pub async fn invalidate(&self) -> RefreshOutcome {
        self.request_refresh().await
    }

    /// Make sure a fetch is in flight and return a handle to its outcome.
    ///
    /// Dropping the handle does not cancel the fetch.
    pub fn request_refresh(&self) -> PendingRefresh {
        let mut slot = self.inner.in_flight.lock();
        if let Some(pending) = slot.as_ref() {
            debug!("Joining in-flight member fetch");
            return pending.clone();
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(inner.refresh());
        let pending = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Arc::new(DirectoryError::Internal(format!(
                    "member fetch task failed: {}",
                    e
                )))),
            }
        }
        .boxed()
        .shared();

        *slot = Some(pending.clone());
        pending
    }
}

impl CacheInner {
    async fn refresh(self: Arc<Self>) -> RefreshOutcome {
        let fetch_no = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(fetch_no, "Starting member fetch");

        let result = self.source.fetch_all().await;

        // Publish and clear the slot atomically with respect to new requests.
        let mut slot = self.in_flight.lock();
        let (outcome, event) = {
            let mut state = self.state.write();
            match result {
                Ok(members) => {
                    let snapshot: Snapshot = Arc::from(members);
                    state.snapshot = Arc::clone(&snapshot);
                    state.load = LoadState::Ready {
                        fetched_at: Utc::now(),
                    };
                    state.generation += 1;
                    info!(
                        fetch_no,
                        generation = state.generation,
                        members = snapshot.len(),
                        "Member snapshot replaced"
                    );
                    let event = CacheEvent::Replaced {
                        generation: state.generation,
                        len: snapshot.len(),
                    };
                    (Ok(snapshot), event)
                }
                Err(e) => {
                    let error = Arc::new(e);
                    warn!(
                        fetch_no,
                        error = %error,
                        kept = state.snapshot.len(),
                        "Member fetch failed; keeping previous snapshot"
                    );
                    state.load = LoadState::Failed {
                        error: Arc::clone(&error),
                    };
                    (
                        Err(Arc::clone(&error)),
                        CacheEvent::RefreshFailed { error },
                    )
                }
            }
        };
        *slot = None;
        drop(slot);

        // No observers is fine.
        let _ = self.events.send(event);
        outcome
    }
}
