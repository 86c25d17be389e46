use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use marketpulse_service::resources::{CalendarEvent, Impact};

use crate::service::RequestService;

use super::{ResourceResponse, ResponseError};

fn default_min_impact() -> Impact {
    Impact::Low
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    /// The calendar day to fetch, defaults to today in the display timezone.
    #[serde(default)]
    date: Option<NaiveDate>,
    /// Display timezone offset in minutes east of UTC, defaults to the
    /// configured one.
    #[serde(default)]
    tz_offset: Option<i32>,
    /// The lowest impact class to include.
    #[serde(default = "default_min_impact")]
    min_impact: Impact,
}

pub async fn handle_calendar_request(
    State(service): State<RequestService>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<ResourceResponse<Vec<CalendarEvent>>>, ResponseError> {
    let request = service.calendar_request(query.date, query.tz_offset, query.min_impact);
    let result = service.calendar.get_or_refresh(request).await;
    Ok(Json(ResourceResponse::from_read_result(result)?))
}
