use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::CacheKey;

/// A successfully fetched value together with its freshness window.
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    /// The upstream payload.
    pub value: T,
    /// When the upstream fetch that produced this value completed.
    pub fetched_at: Instant,
    /// How long after `fetched_at` the value counts as fresh.
    pub freshness: Duration,
}

impl<T> CachedValue<T> {
    /// Whether the value is still within its freshness window.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.freshness
    }
}

/// A cache slot for a single [`CacheKey`].
///
/// An entry can hold a last-known-good value, a rate limit cooldown deadline,
/// or both at once. A cooldown never erases the value, stale data stays
/// servable throughout the cooldown window.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The last successfully fetched value, if any.
    pub value: Option<CachedValue<T>>,
    /// Until when upstream fetches for this key are suppressed.
    pub cooldown_until: Option<Instant>,
}

impl<T> CacheEntry<T> {
    /// Creates an entry holding a freshly fetched value.
    pub fn with_value(value: T, fetched_at: Instant, freshness: Duration) -> Self {
        Self {
            value: Some(CachedValue {
                value,
                fetched_at,
                freshness,
            }),
            cooldown_until: None,
        }
    }

    /// Creates a value-less entry that only records a cooldown deadline.
    ///
    /// This is used when the very first fetch for a key runs into a rate
    /// limit: there is no data to serve, but the deadline must stick so that
    /// subsequent requests do not hammer the upstream.
    pub fn cooldown_placeholder(until: Instant) -> Self {
        Self {
            value: None,
            cooldown_until: Some(until),
        }
    }

    /// Returns a copy of this entry with the cooldown deadline stamped.
    pub fn with_cooldown(mut self, until: Instant) -> Self {
        self.cooldown_until = Some(until);
        self
    }

    /// Whether a rate limit cooldown is currently in effect.
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

/// The in-memory entry store backing a freshness cache.
///
/// This is a thin wrapper around a bounded [`moka`] cache. Entries are only
/// evicted by capacity, never by time: expiry is a read-time decision made by
/// the freshness policy, since an expired value must remain servable as stale
/// data when the upstream is down.
pub struct CacheStore<T> {
    inner: moka::sync::Cache<CacheKey, Arc<CacheEntry<T>>>,
}

impl<T> fmt::Debug for CacheStore<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("name", &self.inner.name())
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl<T> Clone for CacheStore<T>
where
    T: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> CacheStore<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a new bounded store.
    pub fn new(name: &str, capacity: u64) -> Self {
        let inner = moka::sync::Cache::builder()
            .name(name)
            .max_capacity(capacity)
            .build();

        Self { inner }
    }

    /// Looks up the entry for the given key.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry<T>>> {
        self.inner.get(key)
    }

    /// Inserts or replaces the entry for the given key.
    pub fn put(&self, key: CacheKey, entry: CacheEntry<T>) {
        self.inner.insert(key, Arc::new(entry));
    }

    /// The number of entries currently in the store.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
