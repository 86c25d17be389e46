use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use marketpulse_service::resources::MacroIndicator;

use crate::service::RequestService;

use super::{ResourceResponse, ResponseError};

#[derive(Debug, Deserialize)]
pub struct IndicatorsQuery {
    /// Restricts indicators to one region, e.g. `us` or `eu`.
    #[serde(default)]
    region: String,
}

pub async fn handle_indicators_request(
    State(service): State<RequestService>,
    Query(query): Query<IndicatorsQuery>,
) -> Result<Json<ResourceResponse<Vec<MacroIndicator>>>, ResponseError> {
    let request = service.indicators_request(query.region);
    let result = service.indicators.get_or_refresh(request).await;
    Ok(Json(ResourceResponse::from_read_result(result)?))
}
