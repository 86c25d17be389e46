//! The caching core of marketpulse.
//!
//! Every upstream resource is served through a [`FreshCache`], which layers
//! three concerns on top of a bounded in-memory store:
//!
//! - **Freshness**: values carry the freshness window they were stamped with
//!   at write time, and expiry is decided at read time by the
//!   [`FreshnessPolicy`]. Empty and quiet-period values get longer windows.
//! - **Coalescing**: concurrent requests for the same [`CacheKey`] share a
//!   single upstream fetch.
//! - **Degradation**: failed refreshes fall back to the last-known-good
//!   value, and upstream rate limits suppress all fetches for a cooldown
//!   period while stale data remains servable.

mod error;
mod key;
mod memory;
mod policy;
mod store;

#[cfg(test)]
mod tests;

pub use error::{FetchError, FetchResult};
pub use key::{CacheKey, CacheKeyBuilder};
pub use memory::{FreshCache, ReadResult, ResourceRequest, StaleReason};
pub use policy::{Disposition, FreshnessPolicy, ValueShape};
pub use store::{CacheEntry, CacheStore, CachedValue};
