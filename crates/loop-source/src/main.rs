use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use loop_source::config::{SourceConfig, SourceSettings};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "loop-source")]
struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8000
    #[arg(long, env = "SOURCE_BIND")]
    bind: Option<String>,

    /// WAV file to loop
    #[arg(long, env = "AUDIO_FILE")]
    audio_file: Option<String>,

    /// Chunk duration and generation period in milliseconds
    #[arg(long, env = "CHUNK_DURATION_MS")]
    chunk_duration_ms: Option<u32>,

    /// Per-listener queue depth in chunks
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Delay before the first chunk in milliseconds
    #[arg(long)]
    warmup_ms: Option<u64>,

    /// Optional config file (TOML)
    #[arg(long, env = "LOOP_SOURCE_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> SourceConfig {
        SourceConfig {
            bind: self.bind.clone(),
            audio_file: self.audio_file.clone(),
            chunk_duration_ms: self.chunk_duration_ms,
            queue_capacity: self.queue_capacity,
            warmup_ms: self.warmup_ms,
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,loop_source=info,loop_stream=info")
        }))
        .init();

    let file_cfg = match args.config.as_ref() {
        Some(path) => SourceConfig::load(path)?,
        None => SourceConfig::default(),
    };
    let settings = SourceSettings::resolve(&args.overrides().or(file_cfg))?;

    loop_source::startup::run(settings).await
}
