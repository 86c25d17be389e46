use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sentry::integrations::anyhow::capture_anyhow;
use serde::{Deserialize, Serialize};

use marketpulse_service::caching::FetchError;

#[derive(Debug)]
pub struct ResponseError {
    status: StatusCode,
    err: anyhow::Error,
}

impl ResponseError {
    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<FetchError> for ResponseError {
    fn from(err: FetchError) -> Self {
        let status = match &err {
            FetchError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            FetchError::Timeout(_) | FetchError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            FetchError::Malformed(_) | FetchError::Incomplete(_) => StatusCode::BAD_GATEWAY,
            FetchError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let err = match err {
            FetchError::RateLimited => {
                anyhow::Error::new(err).context("upstream is rate limiting us, try again shortly")
            }
            err => anyhow::Error::new(err),
        };

        Self { status, err }
    }
}

impl From<(StatusCode, &'static str)> for ResponseError {
    fn from((code, msg): (StatusCode, &'static str)) -> Self {
        Self {
            status: code,
            err: anyhow::anyhow!(msg),
        }
    }
}

impl From<anyhow::Error> for ResponseError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err,
        }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            capture_anyhow(&self.err);
        }
        let mut response = Json(ApiErrorResponse::from(self.err)).into_response();
        *response.status_mut() = self.status;
        response
    }
}

/// An error response from an api.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ApiErrorResponse {
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    causes: Option<Vec<String>>,
}

impl From<anyhow::Error> for ApiErrorResponse {
    fn from(err: anyhow::Error) -> Self {
        let mut chain = err.chain().map(|err| err.to_string());
        let detail = chain.next();
        let causes: Vec<_> = chain.collect();
        let causes = if causes.is_empty() {
            None
        } else {
            Some(causes)
        };

        ApiErrorResponse { detail, causes }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (FetchError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (
                FetchError::Timeout(Duration::from_secs(10)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                FetchError::Unavailable("502".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                FetchError::Malformed("bad json".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                FetchError::Incomplete("cut off".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (FetchError::InternalError, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ResponseError::from(err).status(), status);
        }
    }

    #[test]
    fn test_rate_limit_detail_tells_caller_to_back_off() {
        let error = ResponseError::from(FetchError::RateLimited);
        let body = ApiErrorResponse::from(error.err);
        assert_eq!(
            body.detail.as_deref(),
            Some("upstream is rate limiting us, try again shortly")
        );
        assert_eq!(body.causes, Some(vec!["upstream rate limited".to_owned()]));
    }
}
