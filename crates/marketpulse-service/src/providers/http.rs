use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::caching::{FetchError, FetchResult};
use crate::config::Config;
use crate::utils::futures::{m, measure, CancelOnDrop};
use crate::utils::http::create_client;

/// The hard safety net for a single request, above every per-category deadline.
const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// The shared HTTP transport for all upstream fetches.
///
/// Every request runs as its own task wrapped in a timeout: when the deadline
/// elapses, the task is dropped and thereby aborted, so a hanging upstream
/// does not keep connections or work alive in the background.
#[derive(Debug)]
pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: create_client(config.connect_timeout, MAX_REQUEST_TIMEOUT),
        }
    }

    /// Fetches and decodes a JSON payload.
    pub async fn get_json<T>(&self, url: Url, timeout: Duration) -> FetchResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = self.client.get(url);
        self.request_json(request, timeout).await
    }

    /// Posts a JSON body and decodes the JSON response.
    pub async fn post_json<T, B>(
        &self,
        url: Url,
        body: &B,
        bearer_token: Option<&str>,
        timeout: Duration,
    ) -> FetchResult<T>
    where
        T: DeserializeOwned + Send + 'static,
        B: Serialize + ?Sized,
    {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }
        self.request_json(request, timeout).await
    }

    async fn request_json<T>(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> FetchResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let job = CancelOnDrop::new(tokio::spawn(execute_json(request)));
        let job = async move {
            match tokio::time::timeout(timeout, job).await {
                // Dropping the handle aborts the request task.
                Err(_) => Err(FetchError::Timeout(timeout)),
                Ok(Err(_)) => Err(FetchError::InternalError),
                Ok(Ok(result)) => result,
            }
        };

        measure("upstream.request", m::result, job).await
    }
}

async fn execute_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> FetchResult<T> {
    let response = request.send().await?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::debug!("Upstream is rate limiting us");
        return Err(FetchError::RateLimited);
    }
    if !status.is_success() {
        tracing::debug!("Unexpected status code from upstream: {status}");
        return Err(FetchError::Unavailable(status.to_string()));
    }

    Ok(response.json().await?)
}
