//! Actix server startup + app wiring.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::api;
use crate::config::RelaySettings;
use crate::ingest::run_ingest_loop;
use crate::openapi;
use crate::scheduler::run_playback_scheduler;
use crate::state::RelayContext;

/// Register every relay route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(api::delay::json_config())
        .service(api::consumer_stream)
        .service(api::set_delay)
        .service(api::status)
        .service(api::health)
        .service(openapi::openapi_json);
}

/// Start ingest and scheduling, then serve until the server stops.
pub async fn run(settings: RelaySettings) -> Result<()> {
    tracing::info!(
        bind = %settings.bind,
        source_url = %settings.source_url,
        relay_id = %settings.relay_id,
        buffer_capacity = settings.buffer_capacity,
        "starting loop-relay"
    );

    let bind = settings.bind;
    let ctx = Arc::new(RelayContext::new(settings));
    let shutdown = CancellationToken::new();
    let ingest = actix_web::rt::spawn(run_ingest_loop(Arc::clone(&ctx), shutdown.clone()));
    let scheduler =
        actix_web::rt::spawn(run_playback_scheduler(Arc::clone(&ctx), shutdown.clone()));

    let data = web::Data::from(ctx);
    let served = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Cors::permissive())
            .wrap(Logger::default().exclude("/status").exclude("/health"))
            .configure(configure)
    })
    .bind(bind)
    .with_context(|| format!("bind {bind}"))?
    .run()
    .await;

    shutdown.cancel();
    for (name, task) in [("ingest", ingest), ("scheduler", scheduler)] {
        if let Err(err) = task.await {
            tracing::warn!(task = name, error = %err, "background task failed");
        }
    }
    served.context("http server")?;
    Ok(())
}
