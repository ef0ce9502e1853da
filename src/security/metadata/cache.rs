use super::{MetadataError, MetadataFetcher, ProviderMetadata};
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(300);

/// Refresh policy of a [`ProviderMetadataCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Age after which a snapshot is refreshed on the next read.
    pub ttl: Duration,
    /// Minimum time between two forced (unknown key) refreshes.
    pub min_refresh_interval: Duration,
    /// Upper bound for one fetch.
    pub fetch_timeout: Duration,
    /// How long past its TTL a snapshot may still be served when a refresh
    /// is in flight or has just failed.
    pub stale_grace: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_METADATA_TTL,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            stale_grace: DEFAULT_STALE_GRACE,
        }
    }
}

impl CacheSettings {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }
}

/// Counters exposed by [`ProviderMetadataCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from a fresh snapshot.
    pub hits: u64,
    /// Underlying fetches started.
    pub fetches: u64,
    /// Fetches that failed or timed out.
    pub failures: u64,
    /// Forced refreshes granted for unknown key IDs.
    pub forced_refreshes: u64,
    /// Forced refreshes refused by the minimum interval.
    pub rate_limited: u64,
    /// Stale snapshots served in place of a fresh one, while a refresh was
    /// in flight or after it failed.
    pub stale_served: u64,
    /// Revision of the current snapshot, `None` before the first fetch.
    pub revision: Option<u64>,
}

#[derive(Debug, Default)]
struct ForcedRefresh {
    last_at: Option<Instant>,
    /// Revision a granted forced refresh is replacing, while it is pending.
    pending_for: Option<u64>,
}

enum ForcedDecision {
    Join,
    Granted { previous: Option<Instant> },
    RateLimited,
}

/// Held by the caller a forced refresh was granted to. Clears the pending
/// marker however the refresh ends; dropped before finishing, it also hands
/// back the rate-limit slot.
struct PendingForced<'a> {
    forced: &'a Mutex<ForcedRefresh>,
    seen_revision: u64,
    previous_last_at: Option<Instant>,
    finished: bool,
}

impl PendingForced<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for PendingForced<'_> {
    fn drop(&mut self) {
        let mut forced = lock(self.forced);
        if forced.pending_for == Some(self.seen_revision) {
            forced.pending_for = None;
        }
        if !self.finished {
            debug!(seen_revision = self.seen_revision, "forced refresh cancelled");
            forced.last_at = self.previous_last_at;
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    fetches: AtomicU64,
    failures: AtomicU64,
    forced_refreshes: AtomicU64,
    rate_limited: AtomicU64,
    stale_served: AtomicU64,
}

/// Process-wide cache of identity provider metadata.
///
/// Readers load the current snapshot without locking and never observe a
/// partially updated one. Refreshes are single-flight: at most one fetch
/// runs at a time and callers waiting on it reuse its outcome, success or
/// failure, instead of fetching again.
///
/// - cold: the first reader fetches, concurrent readers wait for it
/// - TTL expired: one reader refreshes; the others keep getting the
///   previous snapshot until the new one is published. If the refresh fails,
///   the refreshing reader gets the previous snapshot too. Both only hold
///   within [`CacheSettings::stale_grace`] past the TTL; after that every
///   reader waits for the fetch and shares its outcome
/// - [`invalidate`](Self::invalidate): the next read refreshes
/// - [`refresh_unknown_key`](Self::refresh_unknown_key): rate-limited forced
///   refresh for key rotation
pub struct ProviderMetadataCache {
    fetcher: Arc<dyn MetadataFetcher>,
    settings: CacheSettings,
    current: ArcSwapOption<ProviderMetadata>,
    refresh_gate: tokio::sync::Mutex<()>,
    next_revision: AtomicU64,
    invalidated_through: AtomicU64,
    completed_attempts: AtomicU64,
    last_error: Mutex<Option<MetadataError>>,
    forced: Mutex<ForcedRefresh>,
    counters: Counters,
}

impl std::fmt::Debug for ProviderMetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderMetadataCache")
            .field("settings", &self.settings)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProviderMetadataCache {
    pub fn new(fetcher: Arc<dyn MetadataFetcher>, settings: CacheSettings) -> Self {
        Self {
            fetcher,
            settings,
            current: ArcSwapOption::empty(),
            refresh_gate: tokio::sync::Mutex::new(()),
            next_revision: AtomicU64::new(1),
            invalidated_through: AtomicU64::new(0),
            completed_attempts: AtomicU64::new(0),
            last_error: Mutex::new(None),
            forced: Mutex::new(ForcedRefresh::default()),
            counters: Counters::default(),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Current snapshot without triggering any fetch.
    pub fn peek(&self) -> Option<Arc<ProviderMetadata>> {
        self.current.load_full()
    }

    fn is_stale(&self, snapshot: &ProviderMetadata) -> bool {
        snapshot.revision <= self.invalidated_through.load(Ordering::Acquire)
            || snapshot.fetched_at.elapsed() >= self.settings.ttl
    }

    fn within_grace(&self, snapshot: &ProviderMetadata) -> bool {
        let limit = self.settings.ttl.saturating_add(self.settings.stale_grace);
        snapshot.fetched_at.elapsed() < limit
    }

    /// Current metadata, fetching it on cold start or when the cached
    /// snapshot is stale.
    ///
    /// # Errors
    ///
    /// The fetch error when no usable snapshot could be produced: on cold
    /// start, or once the cached snapshot is past its stale grace period.
    pub async fn get_metadata(&self) -> Result<Arc<ProviderMetadata>, MetadataError> {
        if let Some(snapshot) = self.current.load_full() {
            if !self.is_stale(&snapshot) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(snapshot);
            }
            if self.within_grace(&snapshot) {
                return Ok(self.refresh_or_serve_stale(snapshot).await);
            }
        }

        self.single_flight(|current| !self.is_stale(current)).await
    }

    /// Refresh `snapshot` unless another caller already is, falling back to
    /// `snapshot` itself while that refresh runs or when it fails.
    async fn refresh_or_serve_stale(
        &self,
        snapshot: Arc<ProviderMetadata>,
    ) -> Arc<ProviderMetadata> {
        let Ok(_gate) = self.refresh_gate.try_lock() else {
            self.counters.stale_served.fetch_add(1, Ordering::Relaxed);
            return snapshot;
        };
        if let Some(current) = self.current.load_full() {
            if current.revision != snapshot.revision && !self.is_stale(&current) {
                return current;
            }
        }
        debug!(revision = snapshot.revision, "provider metadata stale, refreshing");
        match self.fetch_and_publish().await {
            Ok(fresh) => fresh,
            Err(_) => {
                self.counters.stale_served.fetch_add(1, Ordering::Relaxed);
                warn!(
                    revision = snapshot.revision,
                    age = ?snapshot.fetched_at.elapsed(),
                    "refresh failed, serving stale provider metadata"
                );
                snapshot
            }
        }
    }

    /// Make the next [`get_metadata`](Self::get_metadata) call re-fetch.
    pub fn invalidate(&self) {
        if let Some(snapshot) = self.current.load_full() {
            self.invalidated_through
                .fetch_max(snapshot.revision, Ordering::AcqRel);
            debug!(revision = snapshot.revision, "provider metadata invalidated");
        }
    }

    /// Forced refresh after a token named a key ID missing from the snapshot
    /// with revision `seen_revision`.
    ///
    /// Returns right away with the current snapshot if it is already newer
    /// than `seen_revision`. Concurrent callers that saw the same revision
    /// share one fetch. Outside of that, forced refreshes are granted at most
    /// once per [`CacheSettings::min_refresh_interval`]; a refused caller gets
    /// the current snapshot unchanged.
    pub async fn refresh_unknown_key(
        &self,
        seen_revision: u64,
    ) -> Result<Arc<ProviderMetadata>, MetadataError> {
        if let Some(current) = self.current.load_full() {
            if current.revision > seen_revision {
                return Ok(current);
            }
        }

        let decision = {
            let mut forced = lock(&self.forced);
            if forced.pending_for == Some(seen_revision) {
                ForcedDecision::Join
            } else if forced
                .last_at
                .is_some_and(|at| at.elapsed() < self.settings.min_refresh_interval)
            {
                ForcedDecision::RateLimited
            } else {
                let previous = forced.last_at.replace(Instant::now());
                forced.pending_for = Some(seen_revision);
                ForcedDecision::Granted { previous }
            }
        };

        let pending = match decision {
            ForcedDecision::Join => {
                debug!(seen_revision, "joining pending forced refresh");
                None
            }
            ForcedDecision::Granted { previous } => {
                self.counters.forced_refreshes.fetch_add(1, Ordering::Relaxed);
                info!(seen_revision, "forcing provider metadata refresh for unknown key");
                Some(PendingForced {
                    forced: &self.forced,
                    seen_revision,
                    previous_last_at: previous,
                    finished: false,
                })
            }
            ForcedDecision::RateLimited => {
                self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                warn!(
                    seen_revision,
                    min_interval = ?self.settings.min_refresh_interval,
                    "forced provider metadata refresh rate limited"
                );
                return match self.current.load_full() {
                    Some(current) => Ok(current),
                    None => self.get_metadata().await,
                };
            }
        };

        let result = self
            .single_flight(|current| current.revision > seen_revision)
            .await;
        if let Some(pending) = pending {
            pending.finish();
        }
        result
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            forced_refreshes: c.forced_refreshes.load(Ordering::Relaxed),
            rate_limited: c.rate_limited.load(Ordering::Relaxed),
            stale_served: c.stale_served.load(Ordering::Relaxed),
            revision: self.current.load_full().map(|s| s.revision),
        }
    }

    /// Wait for the refresh gate, then fetch unless the snapshot now
    /// satisfies `done` or an attempt finished while waiting.
    async fn single_flight<F>(&self, done: F) -> Result<Arc<ProviderMetadata>, MetadataError>
    where
        F: Fn(&ProviderMetadata) -> bool,
    {
        let attempts_seen = self.completed_attempts.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().await;

        if let Some(current) = self.current.load_full() {
            if done(&current) {
                return Ok(current);
            }
        }
        if self.completed_attempts.load(Ordering::Acquire) != attempts_seen {
            if let Some(err) = lock(&self.last_error).clone() {
                return Err(err);
            }
        }
        self.fetch_and_publish().await
    }

    /// Caller must hold `refresh_gate`.
    async fn fetch_and_publish(&self) -> Result<Arc<ProviderMetadata>, MetadataError> {
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let timeout = self.settings.fetch_timeout;

        let outcome = match tokio::time::timeout(timeout, self.fetcher.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(MetadataError::Timeout(timeout)),
        };

        let result = match outcome {
            Ok(fetched) => {
                let revision = self.next_revision.fetch_add(1, Ordering::AcqRel);
                let snapshot = Arc::new(ProviderMetadata {
                    document: fetched.document,
                    keys: fetched.keys,
                    revision,
                    fetched_at: Instant::now(),
                });
                self.current.store(Some(Arc::clone(&snapshot)));
                *lock(&self.last_error) = None;
                info!(
                    issuer = %snapshot.issuer(),
                    revision,
                    keys = snapshot.keys.len(),
                    elapsed = ?start.elapsed(),
                    "provider metadata refreshed"
                );
                Ok(snapshot)
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, elapsed = ?start.elapsed(), "provider metadata fetch failed");
                *lock(&self.last_error) = Some(err.clone());
                Err(err)
            }
        };
        self.completed_attempts.fetch_add(1, Ordering::AcqRel);
        result
    }
}
