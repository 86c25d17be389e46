use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::caching::{CacheKey, FetchError, FetchResult, ResourceRequest, ValueShape};
use crate::providers::UpstreamClient;
use crate::utils::futures::retry;

/// A single news headline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Fetches headlines from all configured feeds, merged into one list.
///
/// Individual feed failures are tolerated as long as at least one feed
/// delivers. Only when every feed fails does the fetch itself fail, with the
/// most actionable of the per-feed errors.
#[derive(Debug, Clone)]
pub struct NewsRequest {
    upstream: Arc<UpstreamClient>,
    feeds: Arc<[Url]>,
    timeout: Duration,
    category: String,
}

impl NewsRequest {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        feeds: Arc<[Url]>,
        timeout: Duration,
        category: String,
    ) -> Self {
        Self {
            upstream,
            feeds,
            timeout,
            category,
        }
    }

    fn feed_url(&self, feed: &Url) -> Url {
        let mut url = feed.clone();
        if !self.category.is_empty() {
            url.query_pairs_mut().append_pair("category", &self.category);
        }
        url
    }
}

impl ResourceRequest for NewsRequest {
    type Item = Vec<NewsItem>;

    const NAME: &'static str = "news";

    fn cache_key(&self) -> CacheKey {
        let mut builder = CacheKey::builder(Self::NAME);
        builder.write_param("category", &self.category).unwrap();
        builder.build()
    }

    fn fetch(&self) -> BoxFuture<'static, FetchResult<Vec<NewsItem>>> {
        let request = self.clone();
        Box::pin(async move {
            let mut items = Vec::new();
            let mut fetched_any = false;
            let mut last_error: Option<FetchError> = None;

            for feed in request.feeds.iter() {
                let url = request.feed_url(feed);
                let result = retry(|| {
                    request
                        .upstream
                        .get_json::<Vec<NewsItem>>(url.clone(), request.timeout)
                })
                .await;

                match result {
                    Ok(mut batch) => {
                        fetched_any = true;
                        items.append(&mut batch);
                    }
                    Err(error) => {
                        let dynerr: &dyn std::error::Error = &error;
                        tracing::warn!(error = dynerr, feed = %url, "news feed failed");
                        last_error = Some(match last_error.take() {
                            Some(previous) => previous.prefer(error),
                            None => error,
                        });
                    }
                }
            }

            if !fetched_any {
                if let Some(error) = last_error {
                    return Err(error);
                }
            }

            items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
            Ok(items)
        })
    }

    fn shape(&self, items: &Vec<NewsItem>) -> ValueShape {
        if items.is_empty() {
            ValueShape::Empty
        } else {
            ValueShape::Populated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(category: &str) -> NewsRequest {
        let upstream = Arc::new(UpstreamClient::new(&crate::config::Config::default()));
        NewsRequest::new(
            upstream,
            Arc::from(Vec::<Url>::new()),
            Duration::from_secs(1),
            category.into(),
        )
    }

    #[test]
    fn test_category_scopes_cache_key() {
        assert_ne!(request("markets").cache_key(), request("crypto").cache_key());
        assert_eq!(request("markets").cache_key(), request("markets").cache_key());
    }

    #[test]
    fn test_feed_url_carries_category() {
        let feed: Url = "https://feeds.example.com/news".parse().unwrap();
        let url = request("markets").feed_url(&feed);
        assert_eq!(url.as_str(), "https://feeds.example.com/news?category=markets");

        // No category, no query parameter.
        let url = request("").feed_url(&feed);
        assert_eq!(url.as_str(), "https://feeds.example.com/news");
    }

    #[tokio::test]
    async fn test_no_feeds_is_a_valid_empty_result() {
        let items = request("markets").fetch().await.unwrap();
        assert!(items.is_empty());
        assert_eq!(request("markets").shape(&items), ValueShape::Empty);
    }
}
