//! HTTP handlers for the loop source.

use std::sync::Arc;

use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{Error, HttpResponse, Responder, get, web};
use futures_util::{Stream, stream::unfold};
use loop_stream::Subscription;
use loop_stream::sse::sse_event;
use loop_types::{Chunk, HealthResponse, SourceStatus};

use crate::state::SourceContext;

struct ChunkStreamState {
    subscription: Subscription<Arc<Chunk>>,
    greeting: Option<Bytes>,
}

fn sse_response<S>(body: S) -> HttpResponse
where
    S: Stream<Item = Result<Bytes, Error>> + 'static,
{
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(body)
}

/// Stream looping audio chunks via server-sent events.
///
/// The first event is a named `state` event carrying the current source status;
/// every following event is an unnamed chunk record.
#[utoipa::path(
    get,
    path = "/stream",
    responses(
        (status = 200, description = "Chunk event stream", content_type = "text/event-stream")
    )
)]
#[get("/stream")]
pub async fn stream(state: web::Data<SourceContext>) -> impl Responder {
    let subscription = state.listeners.subscribe(0);
    let snapshot = state.status();
    let greeting = serde_json::to_string(&snapshot).unwrap_or_else(|_| "null".to_string());

    let chunks = unfold(
        ChunkStreamState {
            subscription,
            greeting: Some(Bytes::from(sse_event(Some("state"), &greeting))),
        },
        |mut ctx| async move {
            if let Some(bytes) = ctx.greeting.take() {
                return Some((Ok::<Bytes, Error>(bytes), ctx));
            }
            loop {
                let chunk = ctx.subscription.recv().await?;
                match serde_json::to_string(chunk.as_ref()) {
                    Ok(json) => return Some((Ok(Bytes::from(sse_event(None, &json))), ctx)),
                    Err(err) => {
                        tracing::warn!(
                            client_id = ctx.subscription.id(),
                            error = %err,
                            "failed to encode chunk"
                        );
                    }
                }
            }
        },
    );

    sse_response(chunks)
}

/// Current loop position, format and listener count.
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Source status", body = SourceStatus)
    )
)]
#[get("/status")]
pub async fn status(state: web::Data<SourceContext>) -> impl Responder {
    HttpResponse::Ok().json(state.status())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Source is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
