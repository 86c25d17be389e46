//! The HTTP surface of marketpulse.
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;

use marketpulse_service::metric;

use crate::service::RequestService;

mod brief;
mod calendar;
mod error;
mod indicators;
mod news;
mod posts;
mod response;

pub use error::ResponseError;
pub use response::ResourceResponse;

use brief::handle_brief_request as brief;
use calendar::handle_calendar_request as calendar;
use indicators::handle_indicators_request as indicators;
use news::handle_news_request as news;
use posts::handle_posts_request as posts;

pub async fn healthcheck() -> &'static str {
    metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(service: RequestService) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(DefaultBodyLimit::max(64 * 1024));

    Router::new()
        .route("/news", get(news))
        .route("/calendar", get(calendar))
        .route("/indicators", get(indicators))
        .route("/posts", get(posts))
        .route("/brief", post(brief))
        .with_state(service)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}
