use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};

use crate::caching::{FreshCache, FreshnessPolicy};
use crate::config::{Config, FreshnessConfig};
use crate::providers::UpstreamClient;
use crate::resources::{
    BriefRequest, CalendarRequest, Impact, IndicatorsRequest, NewsRequest, PostsRequest,
};

/// The shared state of all caches and the upstream transport.
///
/// This struct is cheap to clone and is shared across all request handlers.
#[derive(Debug, Clone)]
pub struct SharedServices {
    config: Config,
    upstream: Arc<UpstreamClient>,

    pub news: FreshCache<NewsRequest>,
    pub calendar: FreshCache<CalendarRequest>,
    pub indicators: FreshCache<IndicatorsRequest>,
    pub posts: FreshCache<PostsRequest>,
    pub briefs: FreshCache<BriefRequest>,
}

fn create_cache<R: crate::caching::ResourceRequest>(config: &FreshnessConfig) -> FreshCache<R> {
    FreshCache::new(FreshnessPolicy::from_config(config), config.in_memory_capacity)
}

impl SharedServices {
    pub fn new(config: Config) -> Result<Self> {
        let upstream = Arc::new(UpstreamClient::new(&config));
        let caches = &config.caches;

        Ok(Self {
            news: create_cache(&caches.news),
            calendar: create_cache(&caches.calendar),
            indicators: create_cache(&caches.indicators),
            posts: create_cache(&caches.posts),
            briefs: create_cache(&caches.briefs),
            upstream,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The resource for the aggregated news list of one category.
    pub fn news_request(&self, category: String) -> NewsRequest {
        NewsRequest::new(
            Arc::clone(&self.upstream),
            self.config.upstream.news_feeds.clone().into(),
            self.config.caches.news.fetch_timeout,
            category,
        )
    }

    /// The resource for the calendar of one display-timezone day.
    ///
    /// Without an explicit day, "today" is resolved in the requested
    /// timezone, falling back to the configured display timezone.
    pub fn calendar_request(
        &self,
        day: Option<NaiveDate>,
        tz_offset_minutes: Option<i32>,
        min_impact: Impact,
    ) -> CalendarRequest {
        let tz_offset_minutes = tz_offset_minutes.unwrap_or(self.config.tz_offset_minutes);
        let day = day.unwrap_or_else(|| {
            (Utc::now() + ChronoDuration::minutes(tz_offset_minutes.into())).date_naive()
        });

        CalendarRequest::new(
            Arc::clone(&self.upstream),
            self.config.upstream.calendar_url.clone(),
            self.config.caches.calendar.fetch_timeout,
            day,
            tz_offset_minutes,
            min_impact,
        )
    }

    /// The resource for the macro indicator snapshot of one region.
    pub fn indicators_request(&self, region: String) -> IndicatorsRequest {
        IndicatorsRequest::new(
            Arc::clone(&self.upstream),
            self.config.upstream.indicators_url.clone(),
            self.config.caches.indicators.fetch_timeout,
            region,
        )
    }

    /// The resource for the top community posts of one topic.
    pub fn posts_request(&self, topic: String) -> PostsRequest {
        PostsRequest::new(
            Arc::clone(&self.upstream),
            self.config.upstream.posts_url.clone(),
            self.config.caches.posts.fetch_timeout,
            topic,
        )
    }

    /// The resource for a generated market brief.
    pub fn brief_request(&self, prompt: String) -> BriefRequest {
        BriefRequest::new(
            Arc::clone(&self.upstream),
            self.config.upstream.model_providers.clone().into(),
            self.config.caches.briefs.fetch_timeout,
            self.config.caches.briefs.max_provider_attempts,
            prompt,
        )
    }
}
