//! OpenAPI document for the relay.

use actix_web::{HttpResponse, Responder, get};
use loop_types::{
    AudioFormat, BufferStats, ConsumerHello, HealthResponse, IngestPhase, RelayStatus,
    SetDelayRequest, SetDelayResponse, SourceSnapshot,
};
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::streams::consumer_stream,
        api::delay::set_delay,
        api::diagnostics::status,
        api::diagnostics::health,
    ),
    components(
        schemas(
            ConsumerHello,
            SetDelayRequest,
            SetDelayResponse,
            RelayStatus,
            IngestPhase,
            BufferStats,
            SourceSnapshot,
            AudioFormat,
            HealthResponse,
            api::ErrorResponse,
        )
    ),
    tags(
        (name = "loop-relay", description = "Delay relay for looping audio")
    )
)]
pub struct ApiDoc;

#[get("/api-doc/openapi.json")]
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/stream", "/set-delay", "/status", "/health"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
