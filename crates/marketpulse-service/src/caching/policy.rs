use std::time::{Duration, Instant};

use crate::config::FreshnessConfig;

use super::CacheEntry;

/// The shape of a fetched value, as judged by the resource that fetched it.
///
/// The shape decides which freshness window a value gets at write time. Empty
/// and quiet-period responses are expected to stay unchanged for much longer
/// than populated ones, so refetching them at the normal cadence is wasted
/// upstream budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// A regular, populated response.
    Populated,
    /// An empty but valid response, e.g. a day without calendar events.
    Empty,
    /// A response fetched during a period in which content is not expected to
    /// change, e.g. a market calendar on a weekend.
    Quiet,
}

/// What a read should do for a given cache entry, decided at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No usable value exists, the upstream must be fetched.
    Fetch,
    /// The cached value is within its freshness window and is served as-is.
    Fresh,
    /// The cached value is stale. The upstream is refetched, and the stale
    /// value is the fallback if that fails.
    Refresh,
    /// A rate limit cooldown is in effect. No upstream attempt may be made.
    Cooldown,
}

/// The freshness rules for one cache category.
///
/// This is a pure decision layer: it never touches the store and never
/// performs I/O, which keeps every rule testable with plain values.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    /// Freshness window for populated values.
    pub fresh_for: Duration,
    /// Freshness window for empty or quiet-period values.
    pub quiet_for: Duration,
    /// How long to suppress upstream fetches after a rate limit.
    pub cooldown_for: Duration,
}

impl FreshnessPolicy {
    pub fn from_config(config: &FreshnessConfig) -> Self {
        Self {
            fresh_for: config.fresh_for,
            quiet_for: config.quiet_for,
            cooldown_for: config.cooldown_for,
        }
    }

    /// Decides what a read at `now` should do with the given entry.
    ///
    /// An active cooldown wins over everything else. Expiry is evaluated
    /// here, at read time, against the window stamped on the value when it
    /// was written.
    pub fn decide<T>(&self, entry: Option<&CacheEntry<T>>, now: Instant) -> Disposition {
        let Some(entry) = entry else {
            return Disposition::Fetch;
        };

        if entry.in_cooldown(now) {
            return Disposition::Cooldown;
        }

        match &entry.value {
            None => Disposition::Fetch,
            Some(cached) if cached.is_fresh(now) => Disposition::Fresh,
            Some(_) => Disposition::Refresh,
        }
    }

    /// The freshness window to stamp on a value of the given shape.
    ///
    /// The quiet window never undercuts the regular one, a misconfigured
    /// `quiet_for` must not make empty responses expire faster than
    /// populated ones.
    pub fn window(&self, shape: ValueShape) -> Duration {
        match shape {
            ValueShape::Populated => self.fresh_for,
            ValueShape::Empty | ValueShape::Quiet => self.quiet_for.max(self.fresh_for),
        }
    }

    /// The cooldown deadline for a rate limit observed at `now`.
    pub fn cooldown_deadline(&self, now: Instant) -> Instant {
        now + self.cooldown_for
    }
}
