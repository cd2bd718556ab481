//! Actix server startup + app wiring.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::api;
use crate::chunk_store::ChunkStore;
use crate::config::SourceSettings;
use crate::generator::run_generation_loop;
use crate::openapi;
use crate::state::SourceContext;

/// Register every source route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(api::stream)
        .service(api::status)
        .service(api::health)
        .service(openapi::openapi_json);
}

/// Load the audio, start generating and serve until the server stops.
pub async fn run(settings: SourceSettings) -> Result<()> {
    tracing::info!(
        bind = %settings.bind,
        audio_file = %settings.audio_file.display(),
        chunk_ms = settings.chunk_duration_ms,
        "starting loop-source"
    );

    let store = ChunkStore::load(&settings.audio_file, settings.chunk_duration_ms)
        .with_context(|| format!("load audio {:?}", settings.audio_file))?;
    let ctx = Arc::new(SourceContext::new(Arc::new(store), settings.queue_capacity));

    let shutdown = CancellationToken::new();
    let generation = actix_web::rt::spawn(run_generation_loop(
        Arc::clone(&ctx),
        settings.chunk_period(),
        settings.warmup,
        shutdown.clone(),
    ));

    let data = web::Data::from(ctx);
    let served = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Cors::permissive())
            .wrap(Logger::default().exclude("/status").exclude("/health"))
            .configure(configure)
    })
    .bind(settings.bind)
    .with_context(|| format!("bind {}", settings.bind))?
    .run()
    .await;

    shutdown.cancel();
    if let Err(err) = generation.await {
        tracing::warn!(error = %err, "generation task failed");
    }
    served.context("http server")?;
    Ok(())
}
