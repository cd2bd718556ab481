//! HTTP API handlers.
//!
//! Defines the Actix routes for consumer streams, delay updates and diagnostics.

use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod delay;
pub mod diagnostics;
pub mod streams;

pub use delay::set_delay;
pub use diagnostics::{health, status};
pub use streams::consumer_stream;

/// JSON error body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors surfaced by handlers.
#[derive(Debug)]
pub(crate) enum ApiError {
    /// The request body or query could not be used.
    BadRequest(String),
    /// No connected consumer has this id.
    UnknownConsumer(u64),
}

impl ApiError {
    /// Convert an API error into an HTTP response.
    pub(crate) fn into_response(self) -> HttpResponse {
        match self {
            ApiError::BadRequest(error) => HttpResponse::BadRequest().json(ErrorResponse { error }),
            ApiError::UnknownConsumer(id) => HttpResponse::NotFound().json(ErrorResponse {
                error: format!("unknown client_id {id}"),
            }),
        }
    }
}
