// Process-wide store of async query results, keyed by QueryKey

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use super::key::{QueryFilter, QueryKey};
use crate::config::CacheConfig;
use crate::database::remote::normalize::QueryError;

/// Produces the value cached under one key. Called again on every refetch.
pub type QueryFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, QueryError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// No fetch has started yet.
    Idle,
    /// First fetch in flight, nothing cached.
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct QueryState {
    pub status: QueryStatus,
    pub is_fetching: bool,
    pub data: Option<Value>,
    pub error: Option<QueryError>,
    pub is_invalidated: bool,
    pub data_updated_at: Option<Instant>,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            status: QueryStatus::Idle,
            is_fetching: false,
            data: None,
            error: None,
            is_invalidated: false,
            data_updated_at: None,
        }
    }
}

impl QueryState {
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        if self.is_invalidated || self.status != QueryStatus::Success {
            return true;
        }
        match self.data_updated_at {
            Some(at) => at.elapsed() >= stale_time,
            None => true,
        }
    }

    /// Finished fetching and holding either data or an error.
    pub fn is_settled(&self) -> bool {
        !self.is_fetching && matches!(self.status, QueryStatus::Success | QueryStatus::Error)
    }
}

struct CacheEntry {
    state: watch::Sender<QueryState>,
    query_fn: QueryFn,
    last_active: Instant,
    /// Id of the fetch whose result this entry will accept.
    fetch_id: u64,
    refetch_pending: bool,
}

impl CacheEntry {
    fn new(query_fn: QueryFn) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            state,
            query_fn,
            last_active: Instant::now(),
            fetch_id: 0,
            refetch_pending: false,
        }
    }

    fn observed(&self) -> bool {
        self.state.receiver_count() > 0
    }

    fn is_fetching(&self) -> bool {
        self.state.borrow().is_fetching
    }

    /// Mark the entry as fetching and hand back what to run, unless a fetch
    /// is already in flight.
    fn begin_fetch(&mut self, ids: &AtomicU64) -> Option<(u64, QueryFn)> {
        if self.is_fetching() {
            return None;
        }
        let id = self.next_fetch_id(ids);
        self.state.send_modify(|s| {
            s.is_fetching = true;
            if s.data.is_none() {
                s.status = QueryStatus::Loading;
            }
        });
        Some((id, self.query_fn.clone()))
    }

    fn next_fetch_id(&mut self, ids: &AtomicU64) -> u64 {
        self.refetch_pending = false;
        self.fetch_id = ids.fetch_add(1, Ordering::Relaxed) + 1;
        self.fetch_id
    }
}

struct Inner {
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    fetch_ids: AtomicU64,
    config: CacheConfig,
}

/// Shared query cache. Cloning is cheap and every clone sees the same store.
///
/// Fetches run on the ambient Tokio runtime, so methods that may start one
/// (`subscribe`, `invalidate_queries`, `refetch`) must be called from
/// within a runtime.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryClient {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                fetch_ids: AtomicU64::new(0),
                config,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
        self.inner.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Observe `key`, fetching with `query_fn` when nothing fresh is cached.
    ///
    /// Cached data is served immediately; a stale entry is refetched in the
    /// background and observers see the new state when it lands.
    pub fn subscribe(&self, key: QueryKey, query_fn: QueryFn) -> QueryObserver {
        self.collect_garbage();

        let (rx, start) = {
            let mut entries = self.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(query_fn.clone()));
            entry.query_fn = query_fn;
            entry.last_active = Instant::now();

            let rx = entry.state.subscribe();
            let stale = entry.state.borrow().is_stale(self.inner.config.stale_time);
            let start = if stale {
                entry.begin_fetch(&self.inner.fetch_ids)
            } else {
                None
            };
            (rx, start)
        };

        if let Some((id, query_fn)) = start {
            self.spawn_fetch(key.clone(), id, query_fn);
        }

        QueryObserver {
            key,
            rx,
            client: self.clone(),
        }
    }

    /// Fetch-or-read without keeping an observer around.
    pub async fn fetch_query(&self, key: QueryKey, query_fn: QueryFn) -> Result<Value, QueryError> {
        let mut observer = self.subscribe(key, query_fn);
        let state = observer.settled().await;
        match state.status {
            QueryStatus::Success => Ok(state.data.unwrap_or(Value::Null)),
            _ => Err(state
                .error
                .unwrap_or_else(|| QueryError::new(format!("query {} was removed", observer.key)))),
        }
    }

    fn spawn_fetch(&self, key: QueryKey, id: u64, query_fn: QueryFn) {
        let client = self.clone();
        tokio::spawn(async move {
            log::debug!("fetching {}", key);
            let result = query_fn().await;
            client.finish_fetch(&key, id, result);
        });
    }

    fn finish_fetch(&self, key: &QueryKey, id: u64, result: Result<Value, QueryError>) {
        let next = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key) else {
                log::trace!("discarding result for evicted {}", key);
                return;
            };
            if entry.fetch_id != id {
                log::trace!("discarding superseded result for {}", key);
                return;
            }

            // A mid-fetch invalidation keeps the entry stale, and its refetch
            // starts in the same update that publishes this result.
            let pending = entry.refetch_pending;
            let next = if pending && entry.observed() {
                Some((entry.next_fetch_id(&self.inner.fetch_ids), entry.query_fn.clone()))
            } else {
                entry.refetch_pending = false;
                None
            };
            let refetching = next.is_some();
            entry.state.send_modify(|s| {
                s.is_fetching = refetching;
                match result {
                    Ok(data) => {
                        s.status = QueryStatus::Success;
                        s.data = Some(data);
                        s.error = None;
                        s.data_updated_at = Some(Instant::now());
                        s.is_invalidated = pending;
                    }
                    Err(e) => {
                        s.status = QueryStatus::Error;
                        s.error = Some(e);
                    }
                }
            });
            next
        };

        if let Some((id, query_fn)) = next {
            self.spawn_fetch(key.clone(), id, query_fn);
        }
    }

    /// Mark matching entries stale and refetch the ones being observed.
    ///
    /// Unobserved entries refetch on their next subscription. Returns the
    /// number of entries matched.
    pub fn invalidate_queries(&self, filter: &QueryFilter) -> usize {
        let mut starts = Vec::new();
        let mut matched = 0;
        {
            let mut entries = self.lock();
            for (key, entry) in entries.iter_mut().filter(|(k, _)| filter.matches(k)) {
                matched += 1;
                entry.state.send_modify(|s| s.is_invalidated = true);
                if entry.is_fetching() {
                    // The running fetch may have read rows from before the write.
                    entry.refetch_pending = true;
                } else if entry.observed() {
                    if let Some(start) = entry.begin_fetch(&self.inner.fetch_ids) {
                        starts.push((key.clone(), start));
                    }
                }
            }
        }

        log::debug!(
            "invalidated {} entries matching {}{}",
            matched,
            filter.key,
            if filter.exact { "" } else { "*" }
        );
        for (key, (id, query_fn)) in starts {
            self.spawn_fetch(key, id, query_fn);
        }
        matched
    }

    /// Start a fetch for `key` now, unless one is already running.
    pub fn refetch(&self, key: &QueryKey) {
        let start = self
            .lock()
            .get_mut(key)
            .and_then(|entry| entry.begin_fetch(&self.inner.fetch_ids));
        if let Some((id, query_fn)) = start {
            self.spawn_fetch(key.clone(), id, query_fn);
        }
    }

    pub fn get_query_data(&self, key: &QueryKey) -> Option<Value> {
        self.lock()
            .get(key)
            .and_then(|entry| entry.state.borrow().data.clone())
    }

    pub fn query_state(&self, key: &QueryKey) -> Option<QueryState> {
        self.lock().get(key).map(|entry| entry.state.borrow().clone())
    }

    /// Overwrite the cached value for `key` as if it had just been fetched.
    pub fn set_query_data(&self, key: QueryKey, data: Value) {
        let mut entries = self.lock();
        let entry = entries.entry(key).or_insert_with(|| {
            let cached = data.clone();
            CacheEntry::new(Arc::new(move || {
                let cached = cached.clone();
                async move { Ok::<_, QueryError>(cached) }.boxed()
            }))
        });
        entry.last_active = Instant::now();
        entry.state.send_modify(|s| {
            s.status = QueryStatus::Success;
            s.data = Some(data);
            s.error = None;
            s.is_invalidated = false;
            s.data_updated_at = Some(Instant::now());
        });
    }

    /// Drop matching entries outright. Observers of them stop receiving updates.
    pub fn remove_queries(&self, filter: &QueryFilter) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !filter.matches(key));
        before - entries.len()
    }

    /// Evict unobserved, idle entries older than `gc_time`.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.inner.config.gc_time;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            let keep =
                entry.observed() || entry.is_fetching() || entry.last_active.elapsed() < gc_time;
            if !keep {
                log::trace!("evicting {}", key);
            }
            keep
        });
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(&self, key: &QueryKey) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.last_active = Instant::now();
        }
    }
}

/// A live subscription to one cache entry (the "hook" side of the cache).
///
/// Dropping the observer unsubscribes; an in-flight fetch still completes
/// and lands in the cache.
pub struct QueryObserver {
    key: QueryKey,
    rx: watch::Receiver<QueryState>,
    client: QueryClient,
}

impl QueryObserver {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> QueryState {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change. `false` once the entry is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait until no fetch is running and the entry holds data or an error.
    pub async fn settled(&mut self) -> QueryState {
        if let Ok(state) = self.rx.wait_for(QueryState::is_settled).await {
            return state.clone();
        }
        self.rx.borrow().clone()
    }

    pub fn refetch(&self) {
        self.client.refetch(&self.key);
    }

    /// Current data deserialized into `T`, if any is cached.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, QueryError> {
        let data = self.rx.borrow().data.clone();
        match data {
            Some(data) => Ok(Some(serde_json::from_value(data)?)),
            None => Ok(None),
        }
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        self.client.touch(&self.key);
    }
}
