//! The HTTP server.
use std::net::SocketAddr;

use anyhow::{Context, Result};

use marketpulse_service::config::Config;
use marketpulse_service::metric;

use crate::endpoints;
use crate::service::RequestService;

/// Starts the HTTP server based on the loaded config.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("marketpulse-web")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    let service =
        RequestService::create(config.clone()).context("failed to create service state")?;
    let socket = config.bind.parse::<SocketAddr>()?;
    let server =
        axum_server::bind(socket).serve(endpoints::create_app(service).into_make_service());
    tracing::info!("Starting HTTP server on {}", socket);

    web_pool.block_on(server)?;
    tracing::info!("System shutdown complete");

    Ok(())
}
