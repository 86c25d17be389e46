use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::caching::{CacheKey, FetchError, FetchResult, ResourceRequest, ValueShape};
use crate::providers::UpstreamClient;
use crate::utils::futures::retry;

/// A macroeconomic indicator snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroIndicator {
    pub name: String,
    pub value: f64,
    pub unit: String,
    /// The reporting period the value refers to, e.g. `"2026-Q2"`.
    pub period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<f64>,
}

/// Fetches the macro indicator snapshot for one region.
#[derive(Debug, Clone)]
pub struct IndicatorsRequest {
    upstream: Arc<UpstreamClient>,
    url: Option<Url>,
    timeout: Duration,
    region: String,
}

impl IndicatorsRequest {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        url: Option<Url>,
        timeout: Duration,
        region: String,
    ) -> Self {
        Self {
            upstream,
            url,
            timeout,
            region,
        }
    }
}

impl ResourceRequest for IndicatorsRequest {
    type Item = Vec<MacroIndicator>;

    const NAME: &'static str = "indicators";

    fn cache_key(&self) -> CacheKey {
        let mut builder = CacheKey::builder(Self::NAME);
        builder.write_param("region", &self.region).unwrap();
        builder.build()
    }

    fn fetch(&self) -> BoxFuture<'static, FetchResult<Vec<MacroIndicator>>> {
        let request = self.clone();
        Box::pin(async move {
            let Some(base) = request.url.clone() else {
                return Err(FetchError::Unavailable(
                    "no indicators endpoint configured".to_owned(),
                ));
            };

            let mut url = base;
            if !request.region.is_empty() {
                url.query_pairs_mut().append_pair("region", &request.region);
            }

            retry(|| request.upstream.get_json(url.clone(), request.timeout)).await
        })
    }

    fn shape(&self, indicators: &Vec<MacroIndicator>) -> ValueShape {
        if indicators.is_empty() {
            ValueShape::Empty
        } else {
            ValueShape::Populated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(region: &str) -> IndicatorsRequest {
        let upstream = Arc::new(UpstreamClient::new(&crate::config::Config::default()));
        IndicatorsRequest::new(upstream, None, Duration::from_secs(1), region.into())
    }

    #[test]
    fn test_region_scopes_cache_key() {
        assert_ne!(request("us").cache_key(), request("eu").cache_key());
        assert_eq!(request("us").cache_key(), request("us").cache_key());
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_unavailable() {
        let result = request("us").fetch().await;
        assert!(matches!(result, Err(FetchError::Unavailable(_))));
    }
}
