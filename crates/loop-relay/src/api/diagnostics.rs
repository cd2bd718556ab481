//! Relay diagnostics.

use actix_web::{HttpResponse, Responder, get, web};
use loop_types::{HealthResponse, RelayStatus};

use crate::state::RelayContext;

/// Upstream connectivity, buffer occupancy and the last source snapshot.
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Relay status", body = RelayStatus)
    )
)]
#[get("/status")]
pub async fn status(state: web::Data<RelayContext>) -> impl Responder {
    HttpResponse::Ok().json(state.status())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Relay is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
