//! Delivery records and the zero-delay fast path.

use std::sync::Arc;

use loop_stream::{Delivery, FanOutReport};
use loop_types::{BufferStats, Chunk, DeliveryRecord};

use crate::state::RelayContext;

/// Decorate a chunk for one consumer.
pub fn decorate(
    chunk: &Arc<Chunk>,
    relay_id: &str,
    configured_delay_ms: u32,
    relay_timestamp: i64,
    buffer_stats: BufferStats,
) -> DeliveryRecord {
    DeliveryRecord {
        chunk: Arc::clone(chunk),
        relay_id: relay_id.to_string(),
        relay_timestamp,
        source_timestamp: chunk.timestamp,
        configured_delay_ms,
        actual_delay_ms: relay_timestamp - chunk.timestamp,
        buffer_stats,
    }
}

/// Push a freshly ingested chunk to every zero-delay consumer.
///
/// Runs on the ingest task right after the buffer append, so realtime
/// listeners never wait for a scheduler tick.
pub fn deliver_realtime(
    ctx: &RelayContext,
    seq: u64,
    chunk: &Arc<Chunk>,
    buffer_stats: BufferStats,
    now_ms: i64,
) -> FanOutReport {
    let mut report = FanOutReport::default();
    for session in ctx.consumers.snapshot() {
        if session.delay_ms() != 0 || session.is_closed() {
            continue;
        }
        session.mark_delivered(seq);
        let record = decorate(chunk, &ctx.settings.relay_id, 0, now_ms, buffer_stats);
        let delivery = session.offer(record);
        if delivery == Delivery::Full {
            tracing::debug!(
                client_id = session.id(),
                position = chunk.position,
                "realtime queue full; dropping chunk"
            );
        }
        report.record(delivery);
    }
    report
}
