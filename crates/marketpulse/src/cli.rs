//! Exposes the command line application.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use marketpulse_service::config::Config;
use marketpulse_service::metrics;

use crate::logging;
use crate::server;

fn get_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Marketpulse commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Run the web server.
    Run,
}

/// Command line interface parser.
#[derive(Debug, Parser)]
#[command(bin_name = "marketpulse", version = get_crate_version())]
struct Cli {
    /// Path to your configuration file.
    #[arg(long = "config", short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        session_mode: sentry::SessionMode::Request,
        auto_session_tracking: false,
        ..Default::default()
    });

    // SAFETY: No other threads have been spawned at this point.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        let mut tags = config.metrics.custom_tags.clone();
        if let Some(tag) = config.metrics.hostname_tag.clone() {
            if let Some(name) = hostname::get().ok().and_then(|s| s.into_string().ok()) {
                tags.insert(tag, name);
            }
        }
        if let Some(tag) = config.metrics.environment_tag.clone() {
            if let Some(environment) = sentry.options().environment.as_ref() {
                tags.insert(tag, environment.to_string());
            }
        }
        metrics::configure_statsd(&config.metrics.prefix, statsd, tags);
    }

    match cli.command {
        Command::Run => server::run(config).context("failed to start the server")?,
    }

    Ok(())
}
