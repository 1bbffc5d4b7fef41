use std::time::Duration;

use serde::Deserialize;

use crate::sink::{RetryPolicy, SinkKind};

/// File consulted when `ANALYTICS_CONFIG` is not set. Optional.
pub const DEFAULT_CONFIG_FILE: &str = "analytics.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub staging: StagingConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    /// "text" or "json"
    pub log_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StagingConfig {
    pub backend: StagingBackend,
    pub redis_url: String,
    pub key_prefix: String,
    /// Namespace for payloads that fail to decode. Unset: they are deleted.
    pub dead_letter_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    pub flush_interval_seconds: u64,
    pub sinks: Vec<SinkKind>,
    pub csv_output_directory: String,
    pub document_store_url: String,
    pub document_store_collection: String,
    pub document_store_database: String,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
    pub connect_backoff_max_ms: u64,
}

impl AnalyticsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts,
            initial_backoff: Duration::from_millis(self.connect_backoff_ms),
            max_backoff: Duration::from_millis(self.connect_backoff_max_ms),
        }
    }
}

fn builder() -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(config::Config::builder()
        .set_default("server.listen_addr", "0.0.0.0:3000")?
        .set_default("server.log_level", "info")?
        .set_default("server.log_format", "text")?
        .set_default("staging.backend", "redis")?
        .set_default("staging.redis_url", "redis://127.0.0.1:6379/")?
        .set_default("staging.key_prefix", "analytics-")?
        .set_default("analytics.flush_interval_seconds", 10)?
        .set_default("analytics.sinks", vec!["csv"])?
        .set_default("analytics.csv_output_directory", "./analytics")?
        .set_default("analytics.document_store_url", "")?
        .set_default("analytics.document_store_collection", "tyk_analytics")?
        .set_default("analytics.document_store_database", "analytics")?
        .set_default("analytics.connect_attempts", 5)?
        .set_default("analytics.connect_backoff_ms", 500)?
        .set_default("analytics.connect_backoff_max_ms", 10_000)?)
}

/// Defaults, then the optional TOML file, then `ANALYTICS__*` env vars
/// (e.g. `ANALYTICS__ANALYTICS__FLUSH_INTERVAL_SECONDS=5`,
/// `ANALYTICS__ANALYTICS__SINKS=csv,mongo`).
pub fn load_config() -> anyhow::Result<Config> {
    let path = std::env::var("ANALYTICS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());

    let config = builder()?
        .add_source(config::File::with_name(&path).required(false))
        .add_source(
            config::Environment::with_prefix("ANALYTICS")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("analytics.sinks")
                .try_parsing(true),
        )
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    cfg.validate()?;

    Ok(cfg)
}

/// Parse a TOML document on top of the defaults. Used by tooling and tests.
pub fn from_toml(toml: &str) -> anyhow::Result<Config> {
    let config = builder()?
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    cfg.validate()?;

    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let a = &self.analytics;

        if a.flush_interval_seconds == 0 {
            anyhow::bail!("analytics.flush_interval_seconds must be at least 1");
        }
        if a.sinks.is_empty() {
            anyhow::bail!("At least one analytics sink must be configured");
        }
        if a.sinks.contains(&SinkKind::Csv) && a.csv_output_directory.trim().is_empty() {
            anyhow::bail!("csv sink requires analytics.csv_output_directory");
        }
        if a.sinks.contains(&SinkKind::Mongo) {
            if a.document_store_url.trim().is_empty() {
                anyhow::bail!("mongo sink requires analytics.document_store_url");
            }
            if a.document_store_collection.trim().is_empty() {
                anyhow::bail!("mongo sink requires analytics.document_store_collection");
            }
        }
        if a.connect_attempts == 0 {
            anyhow::bail!("analytics.connect_attempts must be at least 1");
        }

        let s = &self.staging;
        if s.backend == StagingBackend::Redis && s.redis_url.trim().is_empty() {
            anyhow::bail!("redis staging backend requires staging.redis_url");
        }
        // The staging snapshot scans everything under key_prefix
        if s.key_prefix.is_empty() {
            anyhow::bail!("staging.key_prefix must not be empty");
        }
        if let Some(dead) = s.dead_letter_prefix.as_deref() {
            if s.backend == StagingBackend::Memory {
                anyhow::bail!("staging.dead_letter_prefix requires the redis staging backend");
            }
            if dead.is_empty() {
                anyhow::bail!("staging.dead_letter_prefix must not be empty");
            }
            if dead.starts_with(&s.key_prefix) || s.key_prefix.starts_with(dead) {
                anyhow::bail!(
                    "staging.dead_letter_prefix '{}' overlaps staging.key_prefix '{}'",
                    dead,
                    s.key_prefix
                );
            }
        }

        match self.server.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("Unknown server.log_format '{}'", other),
        }

        Ok(())
    }
}
