use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use url::Url;

/// Controls the log format
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the service.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A tag name to report the hostname to, for each metric. Defaults to not sending such a tag.
    pub hostname_tag: Option<String>,
    /// A tag name to report the environment to, for each metric. Defaults to not sending such a tag.
    pub environment_tag: Option<String>,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "marketpulse".to_owned(),
            hostname_tag: None,
            environment_tag: None,
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Freshness rules and upstream budget for one cache category.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FreshnessConfig {
    /// How long a populated value counts as fresh.
    #[serde(with = "humantime_serde")]
    pub fresh_for: Duration,
    /// How long an empty or quiet-period value counts as fresh.
    #[serde(with = "humantime_serde")]
    pub quiet_for: Duration,
    /// How long to suppress upstream fetches after a rate limit.
    #[serde(with = "humantime_serde")]
    pub cooldown_for: Duration,
    /// Hard deadline for a single upstream fetch.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// Upper bound on provider attempts for a single fetch.
    pub max_provider_attempts: usize,
    /// Maximum number of entries kept in memory.
    pub in_memory_capacity: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            fresh_for: Duration::from_secs(5 * 60),
            quiet_for: Duration::from_secs(30 * 60),
            cooldown_for: Duration::from_secs(15 * 60),
            fetch_timeout: Duration::from_secs(10),
            max_provider_attempts: 3,
            in_memory_capacity: 1024,
        }
    }
}

/// The freshness configuration for all cache categories.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfigs {
    /// News headline feeds.
    pub news: FreshnessConfig,
    /// The economic event calendar.
    pub calendar: FreshnessConfig,
    /// Macroeconomic indicator snapshots.
    pub indicators: FreshnessConfig,
    /// Community discussion posts.
    pub posts: FreshnessConfig,
    /// Generated market briefs.
    pub briefs: FreshnessConfig,
}

impl Default for CacheConfigs {
    fn default() -> Self {
        Self {
            news: FreshnessConfig::default(),
            calendar: FreshnessConfig {
                fresh_for: Duration::from_secs(15 * 60),
                quiet_for: Duration::from_secs(6 * 3600),
                cooldown_for: Duration::from_secs(30 * 60),
                fetch_timeout: Duration::from_secs(8),
                ..FreshnessConfig::default()
            },
            indicators: FreshnessConfig {
                fresh_for: Duration::from_secs(10 * 60),
                quiet_for: Duration::from_secs(3600),
                cooldown_for: Duration::from_secs(20 * 60),
                fetch_timeout: Duration::from_secs(8),
                ..FreshnessConfig::default()
            },
            posts: FreshnessConfig {
                fresh_for: Duration::from_secs(3 * 60),
                quiet_for: Duration::from_secs(15 * 60),
                ..FreshnessConfig::default()
            },
            briefs: FreshnessConfig {
                fresh_for: Duration::from_secs(3600),
                quiet_for: Duration::from_secs(4 * 3600),
                cooldown_for: Duration::from_secs(30 * 60),
                fetch_timeout: Duration::from_secs(30),
                max_provider_attempts: 4,
                in_memory_capacity: 256,
            },
        }
    }
}

/// A text generation provider used for market briefs.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelProviderConfig {
    /// A short name identifying the provider in logs and metrics.
    pub name: String,
    /// The generation endpoint.
    pub url: Url,
    /// The model to request from this provider.
    pub model: String,
    /// Bearer token, if the provider requires one.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Output token budget for a regular attempt.
    ///
    /// A retry after truncated output doubles this.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_max_output_tokens() -> u32 {
    1024
}

/// The upstream endpoints marketpulse fetches from.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// News feed endpoints, aggregated into one headline list.
    pub news_feeds: Vec<Url>,
    /// The economic calendar endpoint.
    pub calendar_url: Option<Url>,
    /// The macro indicator endpoint.
    pub indicators_url: Option<Url>,
    /// The community posts endpoint.
    pub posts_url: Option<Url>,
    /// The fallback chain of brief generation providers, in preference order.
    pub model_providers: Vec<ModelProviderConfig>,
}

/// The global config of marketpulse.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port to bind the HTTP webserver to.
    pub bind: String,

    /// If statsd is configured, metrics can be sent here.
    pub metrics: Metrics,

    /// Logging configuration.
    pub logging: Logging,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// Fine-tune cache freshness per category
    pub caches: CacheConfigs,

    /// Upstream endpoints and providers
    pub upstream: UpstreamConfig,

    /// The timeout for establishing an upstream connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Display timezone offset for calendar days, in minutes east of UTC.
    ///
    /// Requests can override this per call.
    pub tz_offset_minutes: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            metrics: Metrics::default(),
            logging: Logging::default(),
            sentry_dsn: None,
            caches: CacheConfigs::default(),
            upstream: UpstreamConfig::default(),
            connect_timeout: Duration::from_millis(500),
            tz_offset_minutes: 0,
        }
    }
}

fn is_docker() -> bool {
    if fs::metadata("/.dockerenv").is_ok() {
        return true;
    }

    fs::read_to_string("/proc/self/cgroup")
        .map(|s| s.contains("/docker"))
        .unwrap_or(false)
}

fn default_bind() -> String {
    if is_docker() {
        // Docker images rely on this service being exposed
        "0.0.0.0:3130".to_owned()
    } else {
        "127.0.0.1:3130".to_owned()
    }
}

impl Config {
    /// Loads the config from a YAML file, or the defaults if no path is given.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config() {
        // It should be possible to set individual caches in reasonable units
        // without affecting other caches' default values.
        let cfg = Config::get(None).unwrap();
        assert_eq!(cfg.caches.calendar.quiet_for, Duration::from_secs(6 * 3600));

        let yaml = r#"
            caches:
              news:
                fresh_for: 90s
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.caches.news.fresh_for, Duration::from_secs(90));
        assert_eq!(cfg.caches.calendar, CacheConfigs::default().calendar);
    }

    #[test]
    fn test_upstream_config() {
        let yaml = r#"
            upstream:
              news_feeds:
                - "https://feeds.example.com/markets"
              model_providers:
                - name: primary
                  url: "https://llm.example.com/v1/generate"
                  model: summarizer-large
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.upstream.news_feeds.len(), 1);

        let provider = &cfg.upstream.model_providers[0];
        assert_eq!(provider.name, "primary");
        assert_eq!(provider.max_output_tokens, 1024);
        assert!(provider.api_token.is_none());
    }

    #[test]
    fn test_empty_config_fails() {
        assert!(Config::from_reader("".as_bytes()).is_err());
    }

    #[test]
    fn test_unknown_level_fails() {
        let yaml = r#"
            logging:
              level: verbose
        "#;
        assert!(Config::from_reader(yaml.as_bytes()).is_err());
    }
}
