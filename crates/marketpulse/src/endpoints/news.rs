use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use marketpulse_service::resources::NewsItem;

use crate::service::RequestService;

use super::{ResourceResponse, ResponseError};

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    /// Restricts headlines to one feed category.
    #[serde(default)]
    category: String,
}

pub async fn handle_news_request(
    State(service): State<RequestService>,
    Query(query): Query<NewsQuery>,
) -> Result<Json<ResourceResponse<Vec<NewsItem>>>, ResponseError> {
    let request = service.news_request(query.category);
    let result = service.news.get_or_refresh(request).await;
    Ok(Json(ResourceResponse::from_read_result(result)?))
}
