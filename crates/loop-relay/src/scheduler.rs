//! Playback scheduler for delayed consumers.

use std::sync::Arc;
use std::time::Instant;

use loop_stream::{ConsumerSession, Delivery, now_millis};
use loop_types::DeliveryRecord;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::delay_buffer::BufferEntry;
use crate::delivery::decorate;
use crate::state::RelayContext;

/// Outcome of one scheduler tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records queued.
    pub delivered: usize,
    /// Consumers whose delay resolved to no entry.
    pub starved: usize,
    /// Consumers skipped because the due entry was already delivered.
    pub duplicates: usize,
    /// Records dropped on full queues.
    pub dropped: usize,
}

/// Deliver the entry due at `now` to every consumer with a non-zero delay.
pub fn schedule_tick_at(ctx: &RelayContext, now: Instant, now_ms: i64) -> TickReport {
    let mut report = TickReport::default();
    let sessions = ctx.consumers.snapshot();
    if sessions.is_empty() {
        return report;
    }

    let (due, stats): (Vec<(Arc<ConsumerSession<DeliveryRecord>>, u32, Option<BufferEntry>)>, _) = {
        let buffer = ctx.buffer.read().unwrap_or_else(|err| err.into_inner());
        let due = sessions
            .into_iter()
            .filter(|session| !session.is_closed())
            .filter_map(|session| {
                let delay_ms = session.delay_ms();
                (delay_ms > 0).then(|| {
                    let entry = buffer.lookup(delay_ms, now);
                    (session, delay_ms, entry)
                })
            })
            .collect();
        (due, buffer.stats_at(now))
    };

    for (session, delay_ms, entry) in due {
        let Some(entry) = entry else {
            report.starved += 1;
            continue;
        };
        if !session.mark_delivered(entry.seq) {
            report.duplicates += 1;
            continue;
        }
        let record = decorate(&entry.chunk, &ctx.settings.relay_id, delay_ms, now_ms, stats);
        match session.offer(record) {
            Delivery::Sent => report.delivered += 1,
            Delivery::Full => {
                tracing::debug!(
                    client_id = session.id(),
                    delay_ms,
                    "delayed queue full; dropping chunk"
                );
                report.dropped += 1;
            }
            Delivery::Closed => {}
        }
    }
    report
}

/// Tick every `settings.tick` until `shutdown` fires.
pub async fn run_playback_scheduler(ctx: Arc<RelayContext>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(ctx.settings.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(
        tick_ms = ctx.settings.tick.as_millis() as u64,
        "playback scheduler started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        let report = schedule_tick_at(&ctx, Instant::now(), now_millis());
        if report != TickReport::default() {
            tracing::trace!(
                delivered = report.delivered,
                starved = report.starved,
                duplicates = report.duplicates,
                dropped = report.dropped,
                "scheduler tick"
            );
        }
    }

    tracing::info!("playback scheduler stopped");
}
