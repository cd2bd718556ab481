use actix_web::{HttpResponse, Responder, get};
use loop_types::{AudioFormat, HealthResponse, SourceStatus};
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(api::stream, api::status, api::health),
    components(schemas(SourceStatus, AudioFormat, HealthResponse)),
    tags(
        (name = "loop-source", description = "Looping audio source")
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
        for path in ["/stream", "/status", "/health"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
