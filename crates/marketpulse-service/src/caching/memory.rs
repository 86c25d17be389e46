use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use sentry::{Hub, SentryFutureExt};

use crate::utils::futures::CallOnDrop;

use super::{
    CacheEntry, CacheKey, CacheStore, Disposition, FetchError, FetchResult, FreshnessPolicy,
    ValueShape,
};

/// The shared channel for an in-flight upstream refresh.
type RefreshChannel<T> = Shared<oneshot::Receiver<FetchResult<T>>>;
/// Map of currently running refreshes, keyed by the resource identity.
type RefreshMap<T> = Arc<Mutex<HashMap<CacheKey, RefreshChannel<T>>>>;

/// A request for a cacheable upstream resource.
///
/// Implementors describe the identity of the resource, how to fetch it from
/// upstream, and how to judge the shape of a fetched value. The cache itself
/// stays generic over all of that.
pub trait ResourceRequest: Clone + Send + Sync + 'static {
    /// The cached payload type.
    type Item: Clone + Send + Sync + 'static;

    /// The resource kind, used for metrics and log tags.
    const NAME: &'static str;

    /// The identity of this request. Everything that affects the upstream
    /// response must contribute to the key.
    fn cache_key(&self) -> CacheKey;

    /// Performs the upstream fetch, including provider fallback and
    /// content validation.
    fn fetch(&self) -> BoxFuture<'static, FetchResult<Self::Item>>;

    /// Judges the shape of a fetched value.
    ///
    /// The shape decides the freshness window stamped on the value.
    fn shape(&self, _item: &Self::Item) -> ValueShape {
        ValueShape::Populated
    }
}

/// Why a read was answered with stale data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// The upstream rate limited us and the cooldown is still in effect.
    Cooldown,
    /// A refresh was attempted and failed with the attached error.
    RefreshFailed(FetchError),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Cooldown => {
                write!(f, "upstream rate limited, serving cached data")
            }
            StaleReason::RefreshFailed(err) => {
                write!(f, "refresh failed ({err}), serving cached data")
            }
        }
    }
}

/// The outcome of a cache read.
#[derive(Debug, Clone)]
pub enum ReadResult<T> {
    /// A value within its freshness window.
    Fresh(T),
    /// A stale value, served because the upstream could not be asked or did
    /// not answer.
    Stale(T, StaleReason),
    /// No value exists and none could be fetched.
    Unavailable(FetchError),
}

impl<T> ReadResult<T> {
    /// The served value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            ReadResult::Fresh(value) | ReadResult::Stale(value, _) => Some(value),
            ReadResult::Unavailable(_) => None,
        }
    }

    /// Whether the served value is stale.
    pub fn is_stale(&self) -> bool {
        matches!(self, ReadResult::Stale(..))
    }
}

/// A freshness-aware, request-coalescing in-memory cache.
///
/// Reads within the freshness window are answered from memory. Expired
/// entries trigger an upstream refresh, with all concurrent requests for the
/// same key coalesced into a single upstream call. Failed refreshes fall back
/// to the last-known-good value, and rate limits suppress upstream traffic
/// for a configured cooldown without discarding servable data.
pub struct FreshCache<R: ResourceRequest> {
    policy: FreshnessPolicy,
    store: CacheStore<R::Item>,
    refreshes: RefreshMap<R::Item>,
}

// FIXME: Why does the derive macro not work here?
//        It complains about `R` not implementing `Clone`, but `R` is only
//        a phantom here, and derives SHOULD be able to handle that.
impl<R: ResourceRequest> Clone for FreshCache<R> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy,
            store: self.store.clone(),
            refreshes: Arc::clone(&self.refreshes),
        }
    }
}

impl<R: ResourceRequest> fmt::Debug for FreshCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreshCache")
            .field("resource", &R::NAME)
            .field("entries", &self.store.entry_count())
            .finish()
    }
}

impl<R: ResourceRequest> FreshCache<R> {
    /// Creates a new cache with the given policy and entry capacity.
    pub fn new(policy: FreshnessPolicy, capacity: u64) -> Self {
        Self {
            policy,
            store: CacheStore::new(R::NAME, capacity),
            refreshes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serves the resource for `request`, refreshing it from upstream if
    /// necessary.
    ///
    /// This is the only read path. It guarantees that a request never
    /// observes an error while a previously fetched value for the same key
    /// still exists, the worst it sees is that value marked as stale.
    pub async fn get_or_refresh(&self, request: R) -> ReadResult<R::Item> {
        let key = request.cache_key();
        metric!(counter("caches.access") += 1, "cache" => R::NAME);

        let now = Instant::now();
        let entry = self.store.get(&key);
        let disposition = self.policy.decide(entry.as_deref(), now);
        let cached = entry.as_ref().and_then(|entry| entry.value.as_ref());

        match (disposition, cached) {
            (Disposition::Fresh, Some(cached)) => {
                metric!(counter("caches.hit") += 1, "cache" => R::NAME);
                ReadResult::Fresh(cached.value.clone())
            }
            (Disposition::Cooldown, Some(cached)) => {
                metric!(counter("caches.cooldown") += 1, "cache" => R::NAME);
                ReadResult::Stale(cached.value.clone(), StaleReason::Cooldown)
            }
            (Disposition::Cooldown, None) => {
                metric!(counter("caches.cooldown") += 1, "cache" => R::NAME);
                ReadResult::Unavailable(FetchError::RateLimited)
            }
            (Disposition::Fetch | Disposition::Refresh, _) | (Disposition::Fresh, None) => {
                metric!(counter("caches.miss") += 1, "cache" => R::NAME);
                match self.spawn_refresh(request, key.clone()).await {
                    Ok(value) => ReadResult::Fresh(value),
                    Err(err) => self.serve_stale(&key, err),
                }
            }
        }
    }

    /// Answers a failed refresh with the last-known-good value if one exists.
    ///
    /// The entry is re-read here because the refresh task may have stamped a
    /// cooldown in the meantime.
    fn serve_stale(&self, key: &CacheKey, err: FetchError) -> ReadResult<R::Item> {
        let entry = self.store.get(key);
        match entry.as_ref().and_then(|entry| entry.value.as_ref()) {
            Some(cached) => {
                metric!(
                    counter("caches.stale_serve") += 1,
                    "cache" => R::NAME,
                    "status" => err.status_tag(),
                );
                let reason = match err {
                    FetchError::RateLimited => StaleReason::Cooldown,
                    err => StaleReason::RefreshFailed(err),
                };
                ReadResult::Stale(cached.value.clone(), reason)
            }
            None => ReadResult::Unavailable(err),
        }
    }

    /// Spawns the upstream refresh as a separate task.
    ///
    /// This does deduplication, by keeping track of the running refreshes
    /// based on their [`CacheKey`]: concurrent callers for the same key all
    /// subscribe to the same channel, and exactly one upstream fetch runs.
    ///
    /// NOTE: This function itself is *not* `async`, because it should eagerly
    /// spawn the refresh on an executor, even if you don't explicitly `await`
    /// its results.
    fn spawn_refresh(&self, request: R, key: CacheKey) -> BoxFuture<'static, FetchResult<R::Item>> {
        let channel = {
            let mut refreshes = self.refreshes.lock().unwrap();
            if let Some(channel) = refreshes.get(&key) {
                // A concurrent request was coalesced onto a running refresh.
                metric!(counter("caches.coalesced") += 1, "cache" => R::NAME);
                channel.clone()
            } else {
                let refresh = self.clone().refresh(request, key.clone());
                let channel = self.create_channel(key.clone(), refresh);
                let evicted = refreshes.insert(key, channel.clone());
                debug_assert!(evicted.is_none());
                channel
            }
        };

        let future = channel.unwrap_or_else(move |_cancelled_error| {
            // The refresh task itself panicked or was dropped.
            Err(FetchError::InternalError)
        });

        Box::pin(future)
    }

    /// Creates a shareable channel that performs the refresh.
    fn create_channel<F>(&self, key: CacheKey, refresh: F) -> RefreshChannel<R::Item>
    where
        F: std::future::Future<Output = FetchResult<R::Item>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let refreshes = Arc::clone(&self.refreshes);
        let remove_refresh_token = CallOnDrop::new(move || {
            refreshes.lock().unwrap().remove(&key);
        });

        let channel = async move {
            let result = refresh.await;
            // Drop the token first to evict from the map. This ensures that callers either
            // get a channel that will receive data, or they create a new channel.
            drop(remove_refresh_token);
            sender.send(result).ok();
        }
        .bind_hub(Hub::new_from_top(Hub::current()));

        tokio::spawn(channel);

        receiver.shared()
    }

    /// Performs the actual upstream fetch and applies the outcome to the store.
    ///
    /// On success, the value is written with the freshness window matching
    /// its shape. A rate limit stamps the cooldown deadline without touching
    /// the last-known-good value. All other errors leave the entry untouched
    /// so that reads keep falling back to it.
    async fn refresh(self, request: R, key: CacheKey) -> FetchResult<R::Item> {
        metric!(counter("upstream.fetch") += 1, "cache" => R::NAME);
        let result = request.fetch().await;

        let now = Instant::now();
        match &result {
            Ok(value) => {
                let shape = request.shape(value);
                let freshness = self.policy.window(shape);
                self.store
                    .put(key, CacheEntry::with_value(value.clone(), now, freshness));
            }
            Err(FetchError::RateLimited) => {
                metric!(counter("upstream.rate_limited") += 1, "cache" => R::NAME);
                let until = self.policy.cooldown_deadline(now);
                let entry = match self.store.get(&key) {
                    Some(previous) => previous.as_ref().clone().with_cooldown(until),
                    None => CacheEntry::cooldown_placeholder(until),
                };
                self.store.put(key, entry);
            }
            Err(err) => {
                let dynerr: &dyn std::error::Error = err;
                tracing::debug!(error = dynerr, cache = R::NAME, "upstream refresh failed");
            }
        }

        result
    }
}
