use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use marketpulse_service::resources::MarketBrief;

use crate::service::RequestService;

use super::{ResourceResponse, ResponseError};

#[derive(Debug, Deserialize)]
pub struct BriefRequestBody {
    /// The prompt describing what the brief should cover.
    pub prompt: String,
}

pub async fn handle_brief_request(
    State(service): State<RequestService>,
    Json(body): Json<BriefRequestBody>,
) -> Result<Json<ResourceResponse<MarketBrief>>, ResponseError> {
    if body.prompt.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "prompt must not be empty").into());
    }

    let request = service.brief_request(body.prompt);
    let result = service.briefs.get_or_refresh(request).await;
    Ok(Json(ResourceResponse::from_read_result(result)?))
}
