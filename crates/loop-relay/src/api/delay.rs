//! Delay updates for connected consumers.

use actix_web::{HttpResponse, Responder, post, web};
use loop_types::{SetDelayRequest, SetDelayResponse};

use super::{ApiError, ErrorResponse};
use crate::state::RelayContext;

/// Change a consumer's playback delay; takes effect on the next scheduler tick.
#[utoipa::path(
    post,
    path = "/set-delay",
    request_body = SetDelayRequest,
    responses(
        (status = 200, description = "Delay applied (clamped to 0..=15000)", body = SetDelayResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 404, description = "Unknown client id", body = ErrorResponse)
    )
)]
#[post("/set-delay")]
pub async fn set_delay(
    state: web::Data<RelayContext>,
    body: web::Json<SetDelayRequest>,
) -> impl Responder {
    let request = body.into_inner();
    match state.consumers.set_delay(request.client_id, request.delay_ms) {
        Some(applied) => HttpResponse::Ok().json(SetDelayResponse {
            status: "ok".to_string(),
            client_id: request.client_id,
            delay_ms: applied,
        }),
        None => ApiError::UnknownConsumer(request.client_id).into_response(),
    }
}

/// JSON extractor config that answers malformed bodies with an [`ErrorResponse`].
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = ApiError::BadRequest(err.to_string()).into_response();
        actix_web::error::InternalError::from_response(err, response).into()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::{App, test};

    use super::*;
    use crate::state::test_support::context;

    macro_rules! delay_app {
        ($ctx:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::from(Arc::clone(&$ctx)))
                    .app_data(json_config())
                    .service(set_delay),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn set_delay_clamps_and_echoes() {
        let ctx = Arc::new(context());
        let consumer = ctx.consumers.subscribe(2_000);
        let app = delay_app!(ctx);

        let req = test::TestRequest::post()
            .uri("/set-delay")
            .set_json(SetDelayRequest { client_id: consumer.id(), delay_ms: 40_000 })
            .to_request();
        let resp: SetDelayResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.client_id, consumer.id());
        assert_eq!(resp.delay_ms, 15_000);
        assert_eq!(ctx.consumers.get(consumer.id()).unwrap().delay_ms(), 15_000);

        let req = test::TestRequest::post()
            .uri("/set-delay")
            .set_json(SetDelayRequest { client_id: consumer.id(), delay_ms: -1 })
            .to_request();
        let resp: SetDelayResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.delay_ms, 0);
    }

    #[actix_web::test]
    async fn unknown_consumer_is_not_found() {
        let ctx = Arc::new(context());
        let app = delay_app!(ctx);
        let req = test::TestRequest::post()
            .uri("/set-delay")
            .set_json(SetDelayRequest { client_id: 77, delay_ms: 100 })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.error.contains("77"));
    }

    #[actix_web::test]
    async fn malformed_body_is_a_json_bad_request() {
        let ctx = Arc::new(context());
        let app = delay_app!(ctx);
        let req = test::TestRequest::post()
            .uri("/set-delay")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"client_id\":\"one\"}")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(!body.error.is_empty());
    }
}
