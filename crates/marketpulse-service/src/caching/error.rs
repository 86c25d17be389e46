use std::time::Duration;

use thiserror::Error;

/// An error that happens when fetching a resource from an upstream provider.
///
/// This error enum is the classification layer between upstream transports
/// and the caching core: the freshness machinery only ever inspects these
/// variants, never transport-specific error types or response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The upstream did not produce a response within the configured deadline.
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),
    /// The upstream signalled that we are being rate limited.
    ///
    /// This variant starts the cooldown window for the affected cache entry.
    #[error("upstream rate limited")]
    RateLimited,
    /// The upstream could not be reached or answered with a server error.
    ///
    /// The attached string contains the upstream's response status or the
    /// transport failure.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    /// The upstream answered successfully, but the payload could not be decoded.
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// The upstream answered with a payload that failed content validation.
    ///
    /// Unlike [`Malformed`](Self::Malformed), this payload was structurally
    /// valid and a retry with adjusted parameters may yield usable content.
    #[error("incomplete content: {0}")]
    Incomplete(String),
    /// An unexpected error in marketpulse itself.
    #[error("internal error")]
    InternalError,
}

/// Shorthand for upstream fetch outcomes.
pub type FetchResult<T> = Result<T, FetchError>;

impl FetchError {
    /// How actionable this error is for a caller deciding what to do next.
    ///
    /// Rate limits and outages tell the caller something concrete (back off,
    /// or come back later), a generic internal error tells them nothing.
    fn actionability(&self) -> u8 {
        match self {
            FetchError::RateLimited => 5,
            FetchError::Unavailable(_) => 4,
            FetchError::Timeout(_) => 3,
            FetchError::Incomplete(_) => 2,
            FetchError::Malformed(_) => 1,
            FetchError::InternalError => 0,
        }
    }

    /// Combines two errors, keeping the more actionable one.
    ///
    /// A provider chain reports a single error for the whole run. When
    /// providers fail for different reasons, the caller is better served by a
    /// rate limit or an outage than by a decode failure. Equally actionable
    /// errors resolve to the later one, so the reported detail reflects the
    /// most recent failure.
    pub fn prefer(self, other: FetchError) -> FetchError {
        if other.actionability() >= self.actionability() {
            other
        } else {
            self
        }
    }

    /// Degrades validation failures once all retry budget is exhausted.
    ///
    /// An [`Incomplete`](Self::Incomplete) that no retry could repair is a
    /// malformed payload as far as callers are concerned.
    pub fn into_final(self) -> FetchError {
        match self {
            FetchError::Incomplete(details) => FetchError::Malformed(details),
            other => other,
        }
    }

    /// A short stable tag for metrics.
    pub fn status_tag(&self) -> &'static str {
        match self {
            FetchError::Timeout(_) => "timeout",
            FetchError::RateLimited => "rate_limited",
            FetchError::Unavailable(_) => "unavailable",
            FetchError::Malformed(_) => "malformed",
            FetchError::Incomplete(_) => "incomplete",
            FetchError::InternalError => "internal",
        }
    }

    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Malformed(err.to_string());
        }

        // Get the top-most cause for a more useful message. The reqwest error
        // itself just says "error sending request".
        let mut cause: &dyn std::error::Error = &err;
        while let Some(inner) = cause.source() {
            cause = inner;
        }
        Self::Unavailable(cause.to_string())
    }
}
