use serde::Serialize;

use marketpulse_service::caching::ReadResult;

use super::ResponseError;

/// The envelope wrapping every resource payload.
///
/// Stale data is served with `stale: true` and a human-readable note, so
/// that clients can distinguish degraded answers from fresh ones.
#[derive(Debug, Serialize)]
pub struct ResourceResponse<T> {
    pub data: T,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl<T> ResourceResponse<T> {
    pub fn from_read_result(result: ReadResult<T>) -> Result<Self, ResponseError> {
        match result {
            ReadResult::Fresh(data) => Ok(Self {
                data,
                stale: false,
                note: None,
            }),
            ReadResult::Stale(data, reason) => Ok(Self {
                data,
                stale: true,
                note: Some(reason.to_string()),
            }),
            ReadResult::Unavailable(err) => Err(err.into()),
        }
    }
}
