//! In-memory snapshot cache with per-key single-flight refresh.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

use crate::dataset::{DatasetClass, DatasetId};
use crate::domain::Snapshot;
use crate::SourceError;

/// How a lookup treats an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Serve a fresh entry when present; fetch otherwise.
    #[default]
    Use,
    /// Fetch even when a fresh entry exists, replacing it on success.
    Refresh,
}

/// Cache identity: a dataset plus an optional query shape.
///
/// A shaped key (e.g. resale transactions for one year) never collides with
/// the dataset's unshaped "all entities" key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub dataset: DatasetId,
    pub shape: Option<String>,
}

impl CacheKey {
    pub const fn all(dataset: DatasetId) -> Self {
        Self {
            dataset,
            shape: None,
        }
    }

    pub fn shaped(dataset: DatasetId, shape: impl Into<String>) -> Self {
        Self {
            dataset,
            shape: Some(shape.into()),
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.shape {
            Some(shape) => write!(f, "{}?{shape}", self.dataset),
            None => write!(f, "{}", self.dataset),
        }
    }
}

/// Time-to-live per dataset class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlPolicy {
    pub realtime_secs: u64,
    /// `None` keeps reference data until it is refreshed explicitly.
    pub reference_secs: Option<u64>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            realtime_secs: 300,
            reference_secs: Some(86_400),
        }
    }
}

impl TtlPolicy {
    pub fn ttl_for(&self, class: DatasetClass) -> Option<Duration> {
        match class {
            DatasetClass::RealTime => Some(Duration::from_secs(self.realtime_secs)),
            DatasetClass::Reference => self.reference_secs.map(Duration::from_secs),
        }
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub snapshot: Arc<Snapshot>,
    /// Served past its TTL because a refresh failed or was still running.
    pub stale: bool,
    /// Served from the cache without waiting on a fetch.
    pub cache_hit: bool,
    /// Refresh failure that caused a stale answer.
    pub refresh_error: Option<SourceError>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Arc<Snapshot>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }

    fn expired_within(&self, now: Instant, grace: Duration) -> bool {
        self.expires_at
            .map_or(true, |expires_at| now.saturating_duration_since(expires_at) <= grace)
    }
}

/// How the last fetch for a key ended.
#[derive(Debug, Clone)]
enum FlightOutcome {
    Stored(Arc<Snapshot>),
    Failed(SourceError),
}

/// Per-key fetch lock; the guard holder is the only caller fetching the key.
#[derive(Debug, Clone, Default)]
struct Flight {
    outcome: Arc<AsyncMutex<Option<FlightOutcome>>>,
    /// Bumped once per finished fetch, after `outcome` is written.
    finished: Arc<AtomicU64>,
}

type FlightGuard = OwnedMutexGuard<Option<FlightOutcome>>;
type FlightMap = HashMap<CacheKey, Flight>;

/// Process-wide snapshot store shared by every service.
///
/// Entries are replaced whole: a successful refresh swaps the `Arc`, a
/// failed one leaves the previous snapshot in place.
#[derive(Debug, Clone)]
pub struct CacheStore {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    flights: Arc<std::sync::Mutex<FlightMap>>,
    stale_grace: Duration,
    wait_limit: Option<Duration>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl CacheStore {
    /// `stale_grace` bounds how long past expiry a concurrent caller may be
    /// handed the previous snapshot instead of waiting for the refresh.
    pub fn new(stale_grace: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            flights: Arc::new(std::sync::Mutex::new(HashMap::new())),
            stale_grace,
            wait_limit: None,
        }
    }

    /// Stop waiting on a fetch after `limit`; the fetch keeps running and
    /// still populates the cache when it completes.
    pub fn with_wait_limit(mut self, limit: Duration) -> Self {
        self.wait_limit = Some(limit);
        self
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey,
        ttl: Option<Duration>,
        mode: CacheMode,
        fetch: F,
    ) -> Result<CacheLookup, SourceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Snapshot, SourceError>> + Send + 'static,
    {
        if mode == CacheMode::Use {
            if let Some(snapshot) = self.fresh(&key).await {
                log::debug!("cache hit for {key}");
                return Ok(hit(snapshot));
            }
        }

        let flight = self.flight(&key);
        let seen = flight.finished.load(Ordering::Acquire);
        let guard = match Arc::clone(&flight.outcome).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(snapshot) = self.within_grace(&key).await {
                    log::debug!("refresh of {key} in flight, serving previous snapshot");
                    return Ok(CacheLookup {
                        snapshot,
                        stale: true,
                        cache_hit: true,
                        refresh_error: None,
                    });
                }

                log::debug!("waiting for in-flight refresh of {key}");
                let guard = Arc::clone(&flight.outcome).lock_owned().await;
                if flight.finished.load(Ordering::Acquire) != seen {
                    match guard.as_ref() {
                        Some(FlightOutcome::Stored(snapshot)) => return Ok(hit(Arc::clone(snapshot))),
                        Some(FlightOutcome::Failed(error)) => {
                            let error = error.clone();
                            drop(guard);
                            log::debug!("in-flight refresh of {key} failed, sharing its error");
                            return self.fallback(&key, error).await;
                        }
                        None => {}
                    }
                }
                if let Some(snapshot) = self.fresh(&key).await {
                    return Ok(hit(snapshot));
                }
                guard
            }
        };

        log::debug!("cache miss for {key}, fetching");
        self.lead(key, ttl, (guard, flight.finished), fetch()).await
    }

    async fn lead<Fut>(
        &self,
        key: CacheKey,
        ttl: Option<Duration>,
        (mut guard, finished): (FlightGuard, Arc<AtomicU64>),
        fetch: Fut,
    ) -> Result<CacheLookup, SourceError>
    where
        Fut: Future<Output = Result<Snapshot, SourceError>> + Send + 'static,
    {
        let store = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let result = fetch.await.map(Arc::new);
            *guard = Some(match &result {
                Ok(snapshot) => {
                    store.insert(task_key, Arc::clone(snapshot), ttl).await;
                    FlightOutcome::Stored(Arc::clone(snapshot))
                }
                Err(error) => FlightOutcome::Failed(error.clone()),
            });
            finished.fetch_add(1, Ordering::Release);
            drop(guard);
            result
        });

        let outcome = match self.wait_limit {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    let error = SourceError::timeout(format!(
                        "gave up waiting for {key} after {} ms; the fetch continues in the background",
                        limit.as_millis()
                    ))
                    .with_dataset(key.dataset);
                    return self.fallback(&key, error).await;
                }
            },
            None => task.await,
        };

        match outcome {
            Ok(Ok(snapshot)) => Ok(CacheLookup {
                snapshot,
                stale: false,
                cache_hit: false,
                refresh_error: None,
            }),
            Ok(Err(error)) => self.fallback(&key, error).await,
            Err(join_error) => {
                let error = SourceError::unavailable(format!("fetch task failed: {join_error}"))
                    .with_dataset(key.dataset);
                self.fallback(&key, error).await
            }
        }
    }

    async fn fallback(&self, key: &CacheKey, error: SourceError) -> Result<CacheLookup, SourceError> {
        let previous = self
            .entries
            .read()
            .await
            .get(key)
            .map(|entry| Arc::clone(&entry.snapshot));

        match previous {
            Some(snapshot) => {
                log::warn!("refresh of {key} failed, serving stale snapshot: {error}");
                Ok(CacheLookup {
                    snapshot,
                    stale: true,
                    cache_hit: true,
                    refresh_error: Some(error),
                })
            }
            None => Err(error),
        }
    }

    async fn fresh(&self, key: &CacheKey) -> Option<Arc<Snapshot>> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    async fn within_grace(&self, key: &CacheKey) -> Option<Arc<Snapshot>> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.expired_within(now, self.stale_grace))
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    async fn insert(&self, key: CacheKey, snapshot: Arc<Snapshot>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(key, CacheEntry {
                snapshot,
                expires_at,
            });
    }

    fn flight(&self, key: &CacheKey) -> Flight {
        let mut flights = match self.flights.lock() {
            Ok(flights) => flights,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Drop locks nobody holds or waits on.
        flights.retain(|_, flight| Arc::strong_count(&flight.outcome) > 1);
        flights.entry(key.clone()).or_default().clone()
    }

    /// Stores a snapshot directly, replacing any previous entry.
    pub async fn put(&self, key: CacheKey, snapshot: Snapshot, ttl: Option<Duration>) {
        self.insert(key, Arc::new(snapshot), ttl).await;
    }

    /// Current snapshot for `key`, fresh or not.
    pub async fn peek(&self, key: &CacheKey) -> Option<Arc<Snapshot>> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Removes every entry of `dataset`, shaped or not.
    pub async fn invalidate_dataset(&self, dataset: DatasetId) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.dataset != dataset);
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of entries, including expired ones kept for stale fallback.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn hit(snapshot: Arc<Snapshot>) -> CacheLookup {
    CacheLookup {
        snapshot,
        stale: false,
        cache_hit: true,
        refresh_error: None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::RecordSet;
    use crate::{SourceErrorKind, UtcDateTime};

    fn snapshot(complete: bool) -> Snapshot {
        Snapshot {
            dataset: DatasetId::UvIndex,
            records: RecordSet::Uv(Vec::new()),
            fetched_at: UtcDateTime::now(),
            source_timestamp: None,
            reported_total: None,
            complete,
            rejected: Vec::new(),
        }
    }

    fn counting_fetch(
        counter: &Arc<AtomicUsize>,
        result: Result<Snapshot, SourceError>,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<Snapshot, SourceError>> + Send>>
    {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn second_lookup_within_ttl_is_a_hit() {
        let cache = CacheStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::all(DatasetId::UvIndex);
        let ttl = Some(Duration::from_secs(60));

        let first = cache
            .get_or_fetch(key.clone(), ttl, CacheMode::Use, counting_fetch(&calls, Ok(snapshot(true))))
            .await
            .expect("first lookup fetches");
        let second = cache
            .get_or_fetch(key, ttl, CacheMode::Use, counting_fetch(&calls, Ok(snapshot(true))))
            .await
            .expect("second lookup hits");

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert!(!second.stale);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_mode_bypasses_a_fresh_entry() {
        let cache = CacheStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::all(DatasetId::UvIndex);
        cache.put(key.clone(), snapshot(true), None).await;

        cache
            .get_or_fetch(key, None, CacheMode::Refresh, counting_fetch(&calls, Ok(snapshot(false))))
            .await
            .expect("refresh succeeds");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_serves_previous_snapshot_as_stale() {
        let cache = CacheStore::new(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::all(DatasetId::UvIndex);
        cache.put(key.clone(), snapshot(true), Some(Duration::ZERO)).await;

        let lookup = cache
            .get_or_fetch(
                key,
                Some(Duration::from_secs(60)),
                CacheMode::Use,
                counting_fetch(&calls, Err(SourceError::unavailable("down"))),
            )
            .await
            .expect("stale entry is served");

        assert!(lookup.stale);
        assert!(lookup.snapshot.complete);
        assert!(lookup.refresh_error.is_some());
    }

    #[tokio::test]
    async fn failure_without_previous_entry_propagates() {
        let cache = CacheStore::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let error = cache
            .get_or_fetch(
                CacheKey::all(DatasetId::Psi),
                None,
                CacheMode::Use,
                counting_fetch(&calls, Err(SourceError::timeout("slow"))),
            )
            .await
            .expect_err("nothing to fall back on");

        assert_eq!(error.code(), "source.timeout");
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn shaped_keys_do_not_collide_with_the_unshaped_key() {
        let cache = CacheStore::default();
        cache.put(CacheKey::all(DatasetId::HdbResale), snapshot(true), None).await;
        cache
            .put(CacheKey::shaped(DatasetId::HdbResale, "year=2024"), snapshot(false), None)
            .await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.invalidate(&CacheKey::shaped(DatasetId::HdbResale, "year=2024")).await);
        assert!(cache.peek(&CacheKey::all(DatasetId::HdbResale)).await.is_some());
        assert_eq!(cache.invalidate_dataset(DatasetId::HdbResale).await, 1);
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_fetch() {
        let cache = CacheStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::all(DatasetId::Psi);

        let slow = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(snapshot(true))
            }
        };

        let (first, second) = tokio::join!(
            cache.get_or_fetch(key.clone(), None, CacheMode::Use, slow(Arc::clone(&calls))),
            cache.get_or_fetch(key.clone(), None, CacheMode::Use, slow(Arc::clone(&calls))),
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiters_share_a_failed_fetch_instead_of_retrying_it() {
        let cache = CacheStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::all(DatasetId::Psi);

        let failing = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(SourceError::unavailable("upstream down"))
            }
        };

        let (first, second, third) = tokio::join!(
            cache.get_or_fetch(key.clone(), None, CacheMode::Use, failing(Arc::clone(&calls))),
            cache.get_or_fetch(key.clone(), None, CacheMode::Use, failing(Arc::clone(&calls))),
            cache.get_or_fetch(key.clone(), None, CacheMode::Use, failing(Arc::clone(&calls))),
        );

        for result in [first, second, third] {
            let error = result.expect_err("nothing cached to fall back on");
            assert_eq!(error.kind(), SourceErrorKind::Unavailable);
            assert_eq!(error.message(), "upstream down");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_within_grace_is_served_while_refresh_runs() {
        let cache = CacheStore::new(Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::all(DatasetId::Psi);
        cache.put(key.clone(), snapshot(true), Some(Duration::ZERO)).await;

        let slow = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(snapshot(false))
            }
        };

        let (leader, concurrent) = tokio::join!(
            cache.get_or_fetch(key.clone(), None, CacheMode::Use, slow(Arc::clone(&calls))),
            cache.get_or_fetch(key.clone(), None, CacheMode::Use, slow(Arc::clone(&calls))),
        );

        let leader = leader.expect("refresh succeeds");
        let concurrent = concurrent.expect("previous snapshot is served");
        assert!(!leader.stale);
        assert!(!leader.snapshot.complete);
        assert!(concurrent.stale);
        assert!(concurrent.cache_hit);
        assert!(concurrent.snapshot.complete);
        assert!(concurrent.refresh_error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_past_grace_waits_for_the_refresh() {
        let cache = CacheStore::new(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::all(DatasetId::Psi);
        cache.put(key.clone(), snapshot(true), Some(Duration::ZERO)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let slow = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(snapshot(false))
            }
        };

        let (leader, waiter) = tokio::join!(
            cache.get_or_fetch(key.clone(), None, CacheMode::Use, slow(Arc::clone(&calls))),
            cache.get_or_fetch(key.clone(), None, CacheMode::Use, slow(Arc::clone(&calls))),
        );

        let leader = leader.expect("refresh succeeds");
        let waiter = waiter.expect("waiter gets the refreshed snapshot");
        assert!(!leader.snapshot.complete);
        assert!(!waiter.stale);
        assert!(!waiter.snapshot.complete);
        assert!(Arc::ptr_eq(&leader.snapshot, &waiter.snapshot));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandoned_fetch_still_populates_the_cache() {
        let cache = CacheStore::default().with_wait_limit(Duration::from_millis(10));
        let key = CacheKey::all(DatasetId::Psi);

        let error = cache
            .get_or_fetch(key.clone(), None, CacheMode::Use, || async {
                tokio::time::sleep(Duration::from_millis(60)).await;
                Ok(snapshot(true))
            })
            .await
            .expect_err("caller gives up first");
        assert_eq!(error.code(), "source.timeout");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.peek(&key).await.is_some());
    }

    #[test]
    fn reference_ttl_can_be_unset() {
        let policy = TtlPolicy {
            realtime_secs: 120,
            reference_secs: None,
        };
        assert_eq!(policy.ttl_for(DatasetClass::RealTime), Some(Duration::from_secs(120)));
        assert_eq!(policy.ttl_for(DatasetClass::Reference), None);
    }
}
