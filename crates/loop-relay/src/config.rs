//! Configuration loading and parsing.
//!
//! Values come from the command line (or its environment variables), then an
//! optional TOML file, then built-in defaults.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use loop_stream::registry::{DEFAULT_QUEUE_CAPACITY, clamp_delay_ms};
use reqwest::Url;
use serde::Deserialize;

pub const DEFAULT_BIND: &str = "0.0.0.0:8001";
pub const DEFAULT_SOURCE_URL: &str = "http://audio-source:8000";
pub const DEFAULT_RELAY_ID: &str = "relay-buffered";
pub const DEFAULT_WINDOW_SECONDS: u32 = 20;
pub const DEFAULT_ENTRIES_PER_SECOND: u32 = 10;
pub const DEFAULT_TICK_MS: u64 = 100;
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Delay applied when a consumer does not ask for one.
pub const DEFAULT_DELAY_MS: i64 = 2_000;

/// Relay configuration; every field is optional so layers can be merged.
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Base URL of the loop source.
    pub source_url: Option<String>,
    /// Identifier stamped on every delivery.
    pub relay_id: Option<String>,
    /// Seconds of history kept in the delay buffer.
    pub window_seconds: Option<u32>,
    /// Expected chunks per second from the source.
    pub entries_per_second: Option<u32>,
    /// Playback scheduler period.
    pub tick_ms: Option<u64>,
    /// Wait between upstream connection attempts.
    pub reconnect_backoff_ms: Option<u64>,
    /// Upstream read inactivity that counts as a disconnect.
    pub idle_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    /// Per-consumer queue depth.
    pub queue_capacity: Option<usize>,
    /// Delay for consumers that connect without `?delay=`.
    pub default_delay_ms: Option<i64>,
}

impl RelayConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<RelayConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Fill unset fields from `base`.
    pub fn or(self, base: RelayConfig) -> RelayConfig {
        RelayConfig {
            bind: self.bind.or(base.bind),
            source_url: self.source_url.or(base.source_url),
            relay_id: self.relay_id.or(base.relay_id),
            window_seconds: self.window_seconds.or(base.window_seconds),
            entries_per_second: self.entries_per_second.or(base.entries_per_second),
            tick_ms: self.tick_ms.or(base.tick_ms),
            reconnect_backoff_ms: self.reconnect_backoff_ms.or(base.reconnect_backoff_ms),
            idle_timeout_ms: self.idle_timeout_ms.or(base.idle_timeout_ms),
            connect_timeout_ms: self.connect_timeout_ms.or(base.connect_timeout_ms),
            queue_capacity: self.queue_capacity.or(base.queue_capacity),
            default_delay_ms: self.default_delay_ms.or(base.default_delay_ms),
        }
    }
}

/// Fully resolved relay settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub bind: SocketAddr,
    /// Source base URL without a trailing slash.
    pub source_url: String,
    pub relay_id: String,
    pub buffer_capacity: usize,
    pub tick: Duration,
    pub reconnect_backoff: Duration,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    pub queue_capacity: usize,
    /// Already clamped into the allowed range.
    pub default_delay_ms: u32,
}

impl RelaySettings {
    /// Apply defaults and validate.
    pub fn resolve(cfg: &RelayConfig) -> Result<Self> {
        let bind = cfg.bind.as_deref().unwrap_or(DEFAULT_BIND);
        let bind = bind.parse().with_context(|| format!("parse bind {bind}"))?;

        let source_url = source_url_from_config(cfg)?;

        let relay_id = cfg
            .relay_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_RELAY_ID)
            .to_string();

        let window = cfg.window_seconds.unwrap_or(DEFAULT_WINDOW_SECONDS) as usize;
        let per_second = cfg.entries_per_second.unwrap_or(DEFAULT_ENTRIES_PER_SECOND) as usize;
        let buffer_capacity = window * per_second;
        if buffer_capacity == 0 {
            anyhow::bail!("window_seconds and entries_per_second must be greater than zero");
        }

        let tick_ms = cfg.tick_ms.unwrap_or(DEFAULT_TICK_MS);
        if tick_ms == 0 {
            anyhow::bail!("tick_ms must be greater than zero");
        }
        let queue_capacity = cfg.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than zero");
        }

        Ok(Self {
            bind,
            source_url,
            relay_id,
            buffer_capacity,
            tick: Duration::from_millis(tick_ms),
            reconnect_backoff: Duration::from_millis(
                cfg.reconnect_backoff_ms.unwrap_or(DEFAULT_RECONNECT_BACKOFF_MS),
            ),
            idle_timeout: Duration::from_millis(
                cfg.idle_timeout_ms.unwrap_or(DEFAULT_IDLE_TIMEOUT_MS),
            ),
            connect_timeout: Duration::from_millis(
                cfg.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
            queue_capacity,
            default_delay_ms: clamp_delay_ms(cfg.default_delay_ms.unwrap_or(DEFAULT_DELAY_MS)),
        })
    }

    /// Upstream event stream endpoint.
    pub fn stream_url(&self) -> String {
        format!("{}/stream", self.source_url)
    }
}

/// Validate the source base URL and strip any trailing slash.
pub fn source_url_from_config(cfg: &RelayConfig) -> Result<String> {
    let raw = cfg
        .source_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(DEFAULT_SOURCE_URL);
    let parsed = Url::parse(raw).with_context(|| format!("parse source_url {raw}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("source_url must use http or https: {raw}");
    }
    Ok(raw.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployment_layout() {
        let settings = RelaySettings::resolve(&RelayConfig::default()).unwrap();
        assert_eq!(settings.bind, DEFAULT_BIND.parse().unwrap());
        assert_eq!(settings.stream_url(), "http://audio-source:8000/stream");
        assert_eq!(settings.relay_id, "relay-buffered");
        assert_eq!(settings.buffer_capacity, 200);
        assert_eq!(settings.tick, Duration::from_millis(100));
        assert_eq!(settings.reconnect_backoff, Duration::from_secs(5));
        assert_eq!(settings.idle_timeout, Duration::from_secs(10));
        assert_eq!(settings.queue_capacity, 10);
        assert_eq!(settings.default_delay_ms, 2_000);
    }

    #[test]
    fn source_url_trailing_slash_is_stripped() {
        let cfg = RelayConfig {
            source_url: Some("http://127.0.0.1:8000/".to_string()),
            ..RelayConfig::default()
        };
        assert_eq!(source_url_from_config(&cfg).unwrap(), "http://127.0.0.1:8000");
    }

    #[test]
    fn source_url_requires_http() {
        let cfg = RelayConfig {
            source_url: Some("ftp://source".to_string()),
            ..RelayConfig::default()
        };
        assert!(source_url_from_config(&cfg).is_err());

        let cfg = RelayConfig {
            source_url: Some("not a url".to_string()),
            ..RelayConfig::default()
        };
        assert!(source_url_from_config(&cfg).is_err());
    }

    #[test]
    fn command_line_wins_over_file_and_default_delay_is_clamped() {
        let cli = RelayConfig {
            tick_ms: Some(50),
            default_delay_ms: Some(60_000),
            ..RelayConfig::default()
        };
        let file: RelayConfig = toml::from_str(
            r#"
            tick_ms = 250
            window_seconds = 5
            relay_id = "relay-b"
            "#,
        )
        .unwrap();
        let settings = RelaySettings::resolve(&cli.or(file)).unwrap();
        assert_eq!(settings.tick, Duration::from_millis(50));
        assert_eq!(settings.buffer_capacity, 50);
        assert_eq!(settings.relay_id, "relay-b");
        assert_eq!(settings.default_delay_ms, 15_000);
    }

    #[test]
    fn rejects_zero_sized_settings() {
        for cfg in [
            RelayConfig { tick_ms: Some(0), ..RelayConfig::default() },
            RelayConfig { queue_capacity: Some(0), ..RelayConfig::default() },
            RelayConfig { window_seconds: Some(0), ..RelayConfig::default() },
        ] {
            assert!(RelaySettings::resolve(&cfg).is_err());
        }
    }
}
