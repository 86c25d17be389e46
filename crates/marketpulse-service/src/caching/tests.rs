use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use super::*;

/// A scripted resource request.
///
/// Each call to `fetch` pops the next scripted outcome and counts the call.
/// An exhausted script yields a default value, so tests only need to script
/// the interesting outcomes.
#[derive(Clone)]
struct TestRequest {
    key: String,
    delay: Duration,
    fetches: Arc<AtomicUsize>,
    script: Arc<Mutex<VecDeque<FetchResult<Vec<String>>>>>,
}

impl TestRequest {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            delay: Duration::ZERO,
            fetches: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn with_delay(key: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(key)
        }
    }

    fn push(&self, result: FetchResult<Vec<String>>) {
        self.script.lock().unwrap().push_back(result);
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ResourceRequest for TestRequest {
    type Item = Vec<String>;

    const NAME: &'static str = "test";

    fn cache_key(&self) -> CacheKey {
        CacheKey::for_testing(self.key.clone())
    }

    fn fetch(&self) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let script = Arc::clone(&self.script);
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec!["default".to_owned()]))
        })
    }

    fn shape(&self, items: &Vec<String>) -> ValueShape {
        if items.is_empty() {
            ValueShape::Empty
        } else {
            ValueShape::Populated
        }
    }
}

fn test_policy() -> FreshnessPolicy {
    FreshnessPolicy {
        fresh_for: Duration::from_millis(100),
        quiet_for: Duration::from_millis(500),
        cooldown_for: Duration::from_millis(200),
    }
}

fn items(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_owned()).collect()
}

#[tokio::test]
async fn test_concurrent_reads_coalesce() {
    let cache = FreshCache::new(test_policy(), 100);
    let request = TestRequest::with_delay("news", Duration::from_millis(50));
    request.push(Ok(items(&["headline"])));

    let (a, b) = tokio::join!(
        cache.get_or_refresh(request.clone()),
        cache.get_or_refresh(request.clone()),
    );

    assert_eq!(request.fetch_count(), 1);
    assert!(matches!(a, ReadResult::Fresh(ref v) if *v == items(&["headline"])));
    assert!(matches!(b, ReadResult::Fresh(ref v) if *v == items(&["headline"])));
}

#[tokio::test]
async fn test_fresh_value_is_served_from_memory() {
    let cache = FreshCache::new(test_policy(), 100);
    let request = TestRequest::new("news");
    request.push(Ok(items(&["headline"])));

    cache.get_or_refresh(request.clone()).await;
    let result = cache.get_or_refresh(request.clone()).await;

    assert_eq!(request.fetch_count(), 1);
    assert!(matches!(result, ReadResult::Fresh(_)));
}

#[tokio::test]
async fn test_expired_value_is_refreshed() {
    let cache = FreshCache::new(test_policy(), 100);
    let request = TestRequest::new("news");
    request.push(Ok(items(&["old"])));

    cache.get_or_refresh(request.clone()).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    request.push(Ok(items(&["new"])));
    let result = cache.get_or_refresh(request.clone()).await;

    assert_eq!(request.fetch_count(), 2);
    assert!(matches!(result, ReadResult::Fresh(ref v) if *v == items(&["new"])));
}

#[tokio::test]
async fn test_stale_value_survives_failed_refresh() {
    let cache = FreshCache::new(test_policy(), 100);
    let request = TestRequest::new("news");
    request.push(Ok(items(&["headline"])));

    cache.get_or_refresh(request.clone()).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    request.push(Err(FetchError::Timeout(Duration::from_secs(10))));
    let result = cache.get_or_refresh(request.clone()).await;

    assert_eq!(request.fetch_count(), 2);
    match result {
        ReadResult::Stale(value, reason) => {
            assert_eq!(value, items(&["headline"]));
            assert_eq!(
                reason,
                StaleReason::RefreshFailed(FetchError::Timeout(Duration::from_secs(10)))
            );
        }
        other => panic!("expected stale value, got {other:?}"),
    }
}

#[tokio::test]
async fn test_error_without_prior_value_is_reported() {
    let cache = FreshCache::new(test_policy(), 100);
    let request = TestRequest::new("news");
    request.push(Err(FetchError::Unavailable("503".into())));

    let result = cache.get_or_refresh(request.clone()).await;
    assert!(matches!(result, ReadResult::Unavailable(FetchError::Unavailable(_))));

    // Errors are not cached, the next read fetches again.
    request.push(Ok(items(&["headline"])));
    let result = cache.get_or_refresh(request.clone()).await;
    assert_eq!(request.fetch_count(), 2);
    assert!(matches!(result, ReadResult::Fresh(_)));
}

#[tokio::test]
async fn test_rate_limit_starts_cooldown() {
    let cache = FreshCache::new(test_policy(), 100);
    let request = TestRequest::new("news");
    request.push(Err(FetchError::RateLimited));

    let result = cache.get_or_refresh(request.clone()).await;
    assert!(matches!(result, ReadResult::Unavailable(FetchError::RateLimited)));

    // During the cooldown no upstream call is made at all.
    let result = cache.get_or_refresh(request.clone()).await;
    assert_eq!(request.fetch_count(), 1);
    assert!(matches!(result, ReadResult::Unavailable(FetchError::RateLimited)));

    // Once the cooldown lapses, fetching resumes.
    tokio::time::sleep(Duration::from_millis(250)).await;
    request.push(Ok(items(&["headline"])));
    let result = cache.get_or_refresh(request.clone()).await;
    assert_eq!(request.fetch_count(), 2);
    assert!(matches!(result, ReadResult::Fresh(_)));
}

#[tokio::test]
async fn test_cooldown_serves_stale_value() {
    let cache = FreshCache::new(test_policy(), 100);
    let request = TestRequest::new("news");
    request.push(Ok(items(&["headline"])));

    cache.get_or_refresh(request.clone()).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    request.push(Err(FetchError::RateLimited));
    let result = cache.get_or_refresh(request.clone()).await;
    assert!(
        matches!(result, ReadResult::Stale(ref v, StaleReason::Cooldown) if *v == items(&["headline"]))
    );

    // Subsequent reads during the cooldown do not touch the upstream and
    // still serve the old value.
    let result = cache.get_or_refresh(request.clone()).await;
    assert_eq!(request.fetch_count(), 2);
    assert!(matches!(result, ReadResult::Stale(_, StaleReason::Cooldown)));

    tokio::time::sleep(Duration::from_millis(250)).await;
    request.push(Ok(items(&["fresh again"])));
    let result = cache.get_or_refresh(request.clone()).await;
    assert_eq!(request.fetch_count(), 3);
    assert!(matches!(result, ReadResult::Fresh(ref v) if *v == items(&["fresh again"])));
}

#[tokio::test]
async fn test_empty_value_gets_quiet_window() {
    let cache = FreshCache::new(test_policy(), 100);
    let request = TestRequest::new("calendar");
    request.push(Ok(items(&[])));

    cache.get_or_refresh(request.clone()).await;

    // Past the regular freshness window, but within the quiet one: the empty
    // value still counts as fresh.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let result = cache.get_or_refresh(request.clone()).await;

    assert_eq!(request.fetch_count(), 1);
    assert!(matches!(result, ReadResult::Fresh(ref v) if v.is_empty()));
}

#[tokio::test]
async fn test_distinct_keys_do_not_coalesce() {
    let cache = FreshCache::new(test_policy(), 100);
    let a = TestRequest::with_delay("news-a", Duration::from_millis(50));
    let b = TestRequest::with_delay("news-b", Duration::from_millis(50));
    a.push(Ok(items(&["a"])));
    b.push(Ok(items(&["b"])));

    let (ra, rb) = tokio::join!(cache.get_or_refresh(a.clone()), cache.get_or_refresh(b.clone()));

    assert_eq!(a.fetch_count(), 1);
    assert_eq!(b.fetch_count(), 1);
    assert!(matches!(ra, ReadResult::Fresh(ref v) if *v == items(&["a"])));
    assert!(matches!(rb, ReadResult::Fresh(ref v) if *v == items(&["b"])));
}
