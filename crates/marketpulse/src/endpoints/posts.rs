use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use marketpulse_service::resources::CommunityPost;

use crate::service::RequestService;

use super::{ResourceResponse, ResponseError};

#[derive(Debug, Deserialize)]
pub struct PostsQuery {
    /// Restricts posts to one discussion topic.
    #[serde(default)]
    topic: String,
}

pub async fn handle_posts_request(
    State(service): State<RequestService>,
    Query(query): Query<PostsQuery>,
) -> Result<Json<ResourceResponse<Vec<CommunityPost>>>, ResponseError> {
    let request = service.posts_request(query.topic);
    let result = service.posts.get_or_refresh(request).await;
    Ok(Json(ResourceResponse::from_read_result(result)?))
}
