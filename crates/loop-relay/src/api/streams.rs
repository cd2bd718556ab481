//! Consumer event streams.

use std::collections::VecDeque;

use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{Error, HttpResponse, Responder, get, web};
use futures_util::{Stream, stream::unfold};
use loop_stream::Subscription;
use loop_stream::sse::{PING_FRAME, sse_event};
use loop_types::{ConsumerHello, DeliveryRecord};
use serde::Deserialize;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};

use crate::state::RelayContext;

const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Raw `delay` value; parsed leniently.
    pub delay: Option<String>,
}

struct ConsumerStreamState {
    subscription: Subscription<DeliveryRecord>,
    pending: VecDeque<Bytes>,
    ping: Interval,
}

fn sse_response<S>(stream: S) -> HttpResponse
where
    S: Stream<Item = Result<Bytes, Error>> + 'static,
{
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(stream)
}

/// Resolve the requested delay; missing or unparseable values use `default_ms`.
fn requested_delay(query: &StreamQuery, default_ms: u32) -> i64 {
    match query.delay.as_deref().map(str::trim) {
        None | Some("") => default_ms as i64,
        Some(raw) => raw.parse::<i64>().unwrap_or_else(|_| {
            tracing::debug!(delay = raw, default_ms, "unparseable delay; using default");
            default_ms as i64
        }),
    }
}

/// Subscribe to delayed playback via server-sent events.
///
/// The first record carries the assigned `client_id` and the applied delay;
/// every following record is a decorated chunk.
#[utoipa::path(
    get,
    path = "/stream",
    params(
        ("delay" = Option<i64>, Query, description = "Playback delay in ms (default 2000, clamped to 0..=15000)")
    ),
    responses(
        (status = 200, description = "Delivery event stream", content_type = "text/event-stream")
    )
)]
#[get("/stream")]
pub async fn consumer_stream(
    state: web::Data<RelayContext>,
    query: web::Query<StreamQuery>,
) -> impl Responder {
    let delay = requested_delay(&query, state.settings.default_delay_ms);
    let subscription = state.consumers.subscribe(delay);
    let hello = ConsumerHello {
        client_id: subscription.id(),
        delay_ms: subscription.initial_delay_ms(),
    };
    let hello_json = serde_json::to_string(&hello).unwrap_or_else(|_| "null".to_string());
    let mut pending = VecDeque::new();
    pending.push_back(Bytes::from(sse_event(None, &hello_json)));

    let mut ping = tokio::time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let stream = unfold(
        ConsumerStreamState {
            subscription,
            pending,
            ping,
        },
        |mut ctx| async move {
            loop {
                if let Some(bytes) = ctx.pending.pop_front() {
                    return Some((Ok::<Bytes, Error>(bytes), ctx));
                }

                tokio::select! {
                    record = ctx.subscription.recv() => {
                        let Some(record) = record else {
                            return None;
                        };
                        match serde_json::to_string(&record) {
                            Ok(json) => ctx.pending.push_back(Bytes::from(sse_event(None, &json))),
                            Err(err) => tracing::warn!(
                                client_id = ctx.subscription.id(),
                                error = %err,
                                "failed to encode delivery"
                            ),
                        }
                    }
                    _ = ctx.ping.tick() => {
                        ctx.pending.push_back(Bytes::from_static(PING_FRAME.as_bytes()));
                    }
                }
            }
        },
    );

    sse_response(stream)
}
