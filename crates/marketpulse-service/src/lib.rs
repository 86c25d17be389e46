//! Core service layer of marketpulse.
//!
//! This crate contains the freshness-aware caching core, the upstream
//! provider plumbing and the resource definitions that the HTTP surface in
//! the `marketpulse` crate exposes. The caching core coalesces concurrent
//! refreshes of the same resource into a single upstream call, keeps stale
//! data around to serve through upstream outages, and backs off entirely
//! while an upstream rate limit is in effect.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod providers;
pub mod resources;
pub mod services;
pub mod utils;
