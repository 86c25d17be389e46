use std::time::Duration;

/// Creates a [`reqwest::Client`] for upstream fetches.
///
/// * `connect_timeout` bounds connection establishment.
/// * `max_timeout` is a hard safety net per request. The effective per-fetch
///   deadline is enforced separately by the upstream client, this one only
///   catches requests that leak past it.
pub fn create_client(connect_timeout: Duration, max_timeout: Duration) -> reqwest::Client {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .connect_timeout(connect_timeout)
        .timeout(max_timeout)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}
