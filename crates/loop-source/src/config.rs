//! Configuration loading and parsing.
//!
//! Values come from the command line (or its environment variables), then an
//! optional TOML file, then built-in defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_AUDIO_FILE: &str = "/app/audio.wav";
pub const DEFAULT_CHUNK_DURATION_MS: u32 = 100;
pub const DEFAULT_WARMUP_MS: u64 = 1_000;

/// Source configuration; every field is optional so layers can be merged.
#[derive(Debug, Default, Deserialize)]
pub struct SourceConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// WAV file to loop.
    pub audio_file: Option<String>,
    /// Duration of one chunk and of one generation tick.
    pub chunk_duration_ms: Option<u32>,
    /// Per-listener queue depth.
    pub queue_capacity: Option<usize>,
    /// Pause before the first chunk is generated.
    pub warmup_ms: Option<u64>,
}

impl SourceConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<SourceConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Fill unset fields from `base`.
    pub fn or(self, base: SourceConfig) -> SourceConfig {
        SourceConfig {
            bind: self.bind.or(base.bind),
            audio_file: self.audio_file.or(base.audio_file),
            chunk_duration_ms: self.chunk_duration_ms.or(base.chunk_duration_ms),
            queue_capacity: self.queue_capacity.or(base.queue_capacity),
            warmup_ms: self.warmup_ms.or(base.warmup_ms),
        }
    }
}

/// Fully resolved source settings.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub bind: SocketAddr,
    pub audio_file: PathBuf,
    pub chunk_duration_ms: u32,
    pub queue_capacity: usize,
    pub warmup: Duration,
}

impl SourceSettings {
    /// Apply defaults and validate.
    pub fn resolve(cfg: &SourceConfig) -> Result<Self> {
        let bind = cfg.bind.as_deref().unwrap_or(DEFAULT_BIND);
        let bind = bind.parse().with_context(|| format!("parse bind {bind}"))?;

        let audio_file = cfg
            .audio_file
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .unwrap_or(DEFAULT_AUDIO_FILE);

        let chunk_duration_ms = cfg.chunk_duration_ms.unwrap_or(DEFAULT_CHUNK_DURATION_MS);
        if chunk_duration_ms == 0 {
            anyhow::bail!("chunk_duration_ms must be greater than zero");
        }
        let queue_capacity = cfg
            .queue_capacity
            .unwrap_or(loop_stream::registry::DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than zero");
        }

        Ok(Self {
            bind,
            audio_file: PathBuf::from(audio_file),
            chunk_duration_ms,
            queue_capacity,
            warmup: Duration::from_millis(cfg.warmup_ms.unwrap_or(DEFAULT_WARMUP_MS)),
        })
    }

    pub fn chunk_period(&self) -> Duration {
        Duration::from_millis(self.chunk_duration_ms as u64)
    }
}
