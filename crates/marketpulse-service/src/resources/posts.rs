use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::caching::{CacheKey, FetchError, FetchResult, ResourceRequest, ValueShape};
use crate::providers::UpstreamClient;
use crate::utils::futures::retry;

/// A community discussion post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityPost {
    pub id: String,
    pub title: String,
    pub author: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub permalink: String,
}

/// Fetches the top community posts for one topic, ordered by score.
#[derive(Debug, Clone)]
pub struct PostsRequest {
    upstream: Arc<UpstreamClient>,
    url: Option<Url>,
    timeout: Duration,
    topic: String,
}

impl PostsRequest {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        url: Option<Url>,
        timeout: Duration,
        topic: String,
    ) -> Self {
        Self {
            upstream,
            url,
            timeout,
            topic,
        }
    }
}

impl ResourceRequest for PostsRequest {
    type Item = Vec<CommunityPost>;

    const NAME: &'static str = "posts";

    fn cache_key(&self) -> CacheKey {
        let mut builder = CacheKey::builder(Self::NAME);
        builder.write_param("topic", &self.topic).unwrap();
        builder.build()
    }

    fn fetch(&self) -> BoxFuture<'static, FetchResult<Vec<CommunityPost>>> {
        let request = self.clone();
        Box::pin(async move {
            let Some(base) = request.url.clone() else {
                return Err(FetchError::Unavailable(
                    "no posts endpoint configured".to_owned(),
                ));
            };

            let mut url = base;
            if !request.topic.is_empty() {
                url.query_pairs_mut().append_pair("topic", &request.topic);
            }

            let mut posts: Vec<CommunityPost> =
                retry(|| request.upstream.get_json(url.clone(), request.timeout)).await?;
            posts.sort_by_key(|post| std::cmp::Reverse(post.score));
            Ok(posts)
        })
    }

    fn shape(&self, posts: &Vec<CommunityPost>) -> ValueShape {
        if posts.is_empty() {
            ValueShape::Empty
        } else {
            ValueShape::Populated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(topic: &str) -> PostsRequest {
        let upstream = Arc::new(UpstreamClient::new(&crate::config::Config::default()));
        PostsRequest::new(upstream, None, Duration::from_secs(1), topic.into())
    }

    #[test]
    fn test_topic_scopes_cache_key() {
        assert_ne!(request("stocks").cache_key(), request("bonds").cache_key());
        assert_eq!(request("stocks").cache_key(), request("stocks").cache_key());
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_unavailable() {
        let result = request("stocks").fetch().await;
        assert!(matches!(result, Err(FetchError::Unavailable(_))));
    }
}
