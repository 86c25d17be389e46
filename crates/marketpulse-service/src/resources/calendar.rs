use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::caching::{CacheKey, FetchError, FetchResult, ResourceRequest, ValueShape};
use crate::providers::UpstreamClient;

/// The market impact classification of a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// A scheduled economic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub time: DateTime<Utc>,
    pub country: String,
    pub title: String,
    pub impact: Impact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

/// Fetches the economic calendar for one display-timezone day.
///
/// The day and the timezone offset are part of the cache identity: the same
/// wall-clock day means different UTC ranges in different timezones, and
/// conflating them would serve events of the wrong day.
#[derive(Debug, Clone)]
pub struct CalendarRequest {
    upstream: Arc<UpstreamClient>,
    url: Option<Url>,
    timeout: Duration,
    day: NaiveDate,
    tz_offset_minutes: i32,
    min_impact: Impact,
}

impl CalendarRequest {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        url: Option<Url>,
        timeout: Duration,
        day: NaiveDate,
        tz_offset_minutes: i32,
        min_impact: Impact,
    ) -> Self {
        Self {
            upstream,
            url,
            timeout,
            day,
            tz_offset_minutes,
            min_impact,
        }
    }

    fn is_weekend(&self) -> bool {
        matches!(self.day.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

impl ResourceRequest for CalendarRequest {
    type Item = Vec<CalendarEvent>;

    const NAME: &'static str = "calendar";

    fn cache_key(&self) -> CacheKey {
        let mut builder = CacheKey::builder(Self::NAME);
        builder.write_param("day", self.day).unwrap();
        builder
            .write_param("tz_offset", self.tz_offset_minutes)
            .unwrap();
        builder
            .write_param("min_impact", format_args!("{:?}", self.min_impact))
            .unwrap();
        builder.build()
    }

    fn fetch(&self) -> BoxFuture<'static, FetchResult<Vec<CalendarEvent>>> {
        let request = self.clone();
        Box::pin(async move {
            let Some(base) = request.url.clone() else {
                return Err(FetchError::Unavailable(
                    "no calendar endpoint configured".to_owned(),
                ));
            };

            let mut url = base;
            url.query_pairs_mut()
                .append_pair("date", &request.day.to_string());

            let events: Vec<CalendarEvent> =
                request.upstream.get_json(url, request.timeout).await?;

            let mut events: Vec<_> = events
                .into_iter()
                .filter(|event| event.impact >= request.min_impact)
                .collect();
            events.sort_by_key(|event| event.time);
            Ok(events)
        })
    }

    fn shape(&self, events: &Vec<CalendarEvent>) -> ValueShape {
        if self.is_weekend() {
            // Markets are closed, the calendar will not change until Monday.
            ValueShape::Quiet
        } else if events.is_empty() {
            ValueShape::Empty
        } else {
            ValueShape::Populated
        }
    }
}
