//! Upstream connection to the loop source.
//!
//! A single task keeps one event stream open, feeding every chunk into the
//! delay buffer and the realtime fast path. Any failure drops back to
//! `disconnected`, waits a fixed backoff and tries again, forever.

use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt, TryStreamExt};
use loop_stream::sse::SseDecoder;
use loop_stream::{FanOutReport, now_millis};
use loop_types::Chunk;
use reqwest::header::ACCEPT;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::delivery::deliver_realtime;
use crate::state::RelayContext;

/// Reasons an upstream session ended.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("connect failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("source answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("stream read failed: {0}")]
    Read(#[source] reqwest::Error),

    #[error("no data from source for {0:?}")]
    Idle(Duration),

    #[error("source closed the stream")]
    Ended,
}

/// Keep the upstream stream open until `shutdown` fires.
pub async fn run_ingest_loop(ctx: Arc<RelayContext>, shutdown: CancellationToken) {
    let client = match reqwest::Client::builder()
        .connect_timeout(ctx.settings.connect_timeout)
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "failed to build http client; ingest disabled");
            return;
        }
    };
    let url = ctx.settings.stream_url();
    tracing::info!(url = %url, "ingest loop started");

    loop {
        ctx.mark_connecting();
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = ingest_once(&ctx, &client, &url) => result,
        };
        ctx.mark_disconnected();
        if let Err(err) = result {
            tracing::warn!(
                url = %url,
                error = %err,
                backoff_ms = ctx.settings.reconnect_backoff.as_millis() as u64,
                "source stream lost; reconnecting"
            );
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(ctx.settings.reconnect_backoff) => {}
        }
    }

    ctx.mark_disconnected();
    tracing::info!("ingest loop stopped");
}

/// One connection: connect, then consume until the stream fails.
async fn ingest_once(
    ctx: &RelayContext,
    client: &reqwest::Client,
    url: &str,
) -> Result<(), IngestError> {
    let resp = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(IngestError::Connect)?;
    if !resp.status().is_success() {
        return Err(IngestError::Status(resp.status()));
    }

    ctx.mark_streaming();
    tracing::info!(url = %url, "connected to source");
    consume_stream(ctx, resp.bytes_stream().map_err(IngestError::Read)).await
}

/// Decode an SSE body and ingest every chunk record in it.
///
/// Only returns on error; a clean end of stream is reported as [`IngestError::Ended`].
pub async fn consume_stream<S, B>(ctx: &RelayContext, stream: S) -> Result<(), IngestError>
where
    S: Stream<Item = Result<B, IngestError>>,
    B: AsRef<[u8]>,
{
    let idle = ctx.settings.idle_timeout;
    let mut stream = pin!(stream);
    let mut decoder = SseDecoder::new();
    loop {
        let next = tokio::time::timeout(idle, stream.next())
            .await
            .map_err(|_| IngestError::Idle(idle))?;
        let Some(bytes) = next else {
            return Err(IngestError::Ended);
        };
        for event in decoder.push(bytes?.as_ref()) {
            if !event.is_message() {
                tracing::debug!(event = ?event.event, "ignoring named source event");
                continue;
            }
            handle_record(ctx, &event.data);
        }
    }
}

/// Parse one record; malformed records are skipped.
pub fn handle_record(ctx: &RelayContext, data: &str) -> Option<FanOutReport> {
    match serde_json::from_str::<Chunk>(data) {
        Ok(chunk) => Some(handle_chunk(ctx, Arc::new(chunk), Instant::now(), now_millis())),
        Err(err) => {
            tracing::warn!(error = %err, len = data.len(), "skipping malformed source record");
            None
        }
    }
}

/// Buffer a chunk and hand it to zero-delay consumers.
pub fn handle_chunk(
    ctx: &RelayContext,
    chunk: Arc<Chunk>,
    now: Instant,
    now_ms: i64,
) -> FanOutReport {
    let (seq, stats) = ctx.record_chunk(Arc::clone(&chunk), now, now_ms);
    let report = deliver_realtime(ctx, seq, &chunk, stats, now_ms);
    if chunk.position == 0 {
        tracing::debug!(
            interval_id = %chunk.interval_id,
            loop_count = chunk.loop_count,
            "source loop boundary"
        );
    }
    report
}
