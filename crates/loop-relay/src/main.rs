use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use loop_relay::config::{RelayConfig, RelaySettings};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "loop-relay")]
struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8001
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// Base URL of the loop source, e.g. http://audio-source:8000
    #[arg(long, env = "AUDIO_SOURCE_URL")]
    source_url: Option<String>,

    /// Identifier stamped on every delivery
    #[arg(long, env = "RELAY_ID")]
    relay_id: Option<String>,

    /// Delay for consumers that connect without one, in milliseconds
    #[arg(long)]
    default_delay_ms: Option<i64>,

    /// Wait between upstream reconnect attempts in milliseconds
    #[arg(long)]
    reconnect_backoff_ms: Option<u64>,

    /// Per-consumer queue depth in records
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Optional config file (TOML)
    #[arg(long, env = "LOOP_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> RelayConfig {
        RelayConfig {
            bind: self.bind.clone(),
            source_url: self.source_url.clone(),
            relay_id: self.relay_id.clone(),
            default_delay_ms: self.default_delay_ms,
            reconnect_backoff_ms: self.reconnect_backoff_ms,
            queue_capacity: self.queue_capacity,
            ..RelayConfig::default()
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,loop_relay=info,loop_stream=info")
        }))
        .init();

    let file_cfg = match args.config.as_ref() {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };
    let settings = RelaySettings::resolve(&args.overrides().or(file_cfg))?;

    loop_relay::startup::run(settings).await
}
