//! The upstream resources marketpulse serves.
//!
//! Each resource implements [`ResourceRequest`](crate::caching::ResourceRequest):
//! it knows its cache identity, how to fetch itself from upstream, and how to
//! judge the shape of a fetched value. Everything else, freshness, request
//! coalescing and degradation, is handled generically by the caching core.

mod briefs;
mod calendar;
mod indicators;
mod news;
mod posts;

pub use briefs::{BriefRequest, MarketBrief, REQUIRED_SECTIONS};
pub use calendar::{CalendarEvent, CalendarRequest, Impact};
pub use indicators::{IndicatorsRequest, MacroIndicator};
pub use news::{NewsItem, NewsRequest};
pub use posts::{CommunityPost, PostsRequest};
