//! Marketpulse.
//!
//! Marketpulse is a standalone web service that aggregates market news
//! headlines, economic calendar events, macroeconomic indicators and
//! community discussion, and generates market briefs through a fallback
//! chain of text generation providers. Every resource is served through a
//! freshness-aware cache that coalesces concurrent upstream fetches and
//! degrades to stale data when upstreams fail or rate limit.

#![warn(
    missing_docs,
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

mod cli;
mod endpoints;
mod logging;
mod server;
mod service;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
