//! Upstream provider plumbing.
//!
//! [`UpstreamClient`] is the shared HTTP transport with hard, cancelable
//! per-fetch deadlines. [`FallbackChain`] runs an ordered list of equivalent
//! providers until one of them produces valid content.

mod chain;
mod http;

pub use chain::{AttemptBudget, FallbackChain, Provider};
pub use http::UpstreamClient;
