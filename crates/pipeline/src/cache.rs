//! Per-resource cache with single-flight fetching.
//!
//! Each [`ResourceKind`] has at most one upstream fetch in flight. Callers that
//! arrive while it runs await the same shared future instead of issuing their
//! own request. Bookkeeping (clearing the in-flight slot, storing the result)
//! runs inside that shared future, so it happens exactly once no matter which
//! waiter drives it or how many give up early.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{Error, SourceKind};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::debug;

/// What is being cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Forecast,
    Station(SourceKind),
}

/// A fetched payload with its age.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }
}

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, Error>>>;

struct Slot<T> {
    entry: Option<CacheEntry<T>>,
    in_flight: Option<(u64, SharedFetch<T>)>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            entry: None,
            in_flight: None,
        }
    }
}

/// Thread-safe single-flight cache.
pub struct SingleFlightCache<T> {
    slots: Arc<DashMap<ResourceKind, Slot<T>>>,
    next_flight: AtomicU64,
}

impl<T> Default for SingleFlightCache<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            next_flight: AtomicU64::new(1),
        }
    }
}

impl<T> SingleFlightCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a valid cached payload, or join/start a fetch.
    ///
    /// `force` skips the validity check but still joins a fetch that is
    /// already running. On failure the previous entry is left untouched and
    /// every waiter receives the same error.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        kind: ResourceKind,
        force: bool,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let shared = {
            let mut slot = self.slots.entry(kind).or_default();

            if let Some((_, pending)) = &slot.in_flight {
                debug!(?kind, "Joining in-flight fetch");
                pending.clone()
            } else {
                if !force {
                    if let Some(entry) = slot.entry.as_ref().filter(|e| e.is_valid()) {
                        return Ok(entry.payload.clone());
                    }
                }

                let flight = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let slots = Arc::clone(&self.slots);
                let upstream = fetch();

                let pending = async move {
                    let result = upstream.await;
                    if let Some(mut slot) = slots.get_mut(&kind) {
                        if matches!(slot.in_flight, Some((id, _)) if id == flight) {
                            slot.in_flight = None;
                        }
                        if let Ok(payload) = &result {
                            slot.entry = Some(CacheEntry {
                                payload: payload.clone(),
                                fetched_at: Instant::now(),
                                ttl,
                            });
                        }
                    }
                    result
                }
                .boxed()
                .shared();

                debug!(?kind, flight, force, "Starting upstream fetch");
                slot.in_flight = Some((flight, pending.clone()));
                pending
            }
        };

        shared.await
    }

    /// Current entry, valid or not. Useful for showing last-known data.
    pub fn peek(&self, kind: ResourceKind) -> Option<CacheEntry<T>> {
        self.slots.get(&kind).and_then(|slot| slot.entry.clone())
    }

    /// Drop the stored entry. A running fetch is left alone.
    pub fn invalidate(&self, kind: ResourceKind) {
        if let Some(mut slot) = self.slots.get_mut(&kind) {
            slot.entry = None;
        }
    }

    pub fn is_in_flight(&self, kind: ResourceKind) -> bool {
        self.slots
            .get(&kind)
            .map(|slot| slot.in_flight.is_some())
            .unwrap_or(false)
    }
}
