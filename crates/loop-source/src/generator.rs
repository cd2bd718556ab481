//! Looping chunk generation.

use std::sync::Arc;
use std::time::Duration;

use loop_stream::now_millis;
use loop_types::{Chunk, SourceStatus};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chunk_store::ChunkStore;
use crate::state::SourceContext;

/// Walks the chunk store forever, tagging each chunk with loop metadata.
pub struct LoopGenerator {
    store: Arc<ChunkStore>,
    interval_id: String,
    loop_count: u64,
    position: u32,
}

impl LoopGenerator {
    pub fn new(store: Arc<ChunkStore>) -> Self {
        Self {
            store,
            interval_id: new_interval_id(),
            loop_count: 0,
            position: 0,
        }
    }

    pub fn total_chunks(&self) -> u32 {
        self.store.len() as u32
    }

    pub fn interval_id(&self) -> &str {
        &self.interval_id
    }

    /// Build the chunk at the current position and advance.
    ///
    /// Wrapping back to position 0 starts a new interval and bumps the loop count.
    pub fn next_chunk(&mut self, now_ms: i64) -> Arc<Chunk> {
        let format = self.store.format();
        let chunk = Arc::new(Chunk {
            interval_id: self.interval_id.clone(),
            loop_count: self.loop_count,
            position: self.position,
            total_chunks: self.total_chunks(),
            timestamp: now_ms,
            audio: Arc::clone(self.store.chunk(self.position as usize)),
            sample_rate: format.sample_rate,
            channels: format.channels,
            sample_width: format.sample_width(),
            audio_format: format,
        });

        self.position = (self.position + 1) % self.total_chunks();
        if self.position == 0 {
            self.loop_count += 1;
            self.interval_id = new_interval_id();
            tracing::info!(
                loop_count = self.loop_count,
                interval_id = %self.interval_id,
                "loop restarted"
            );
        }
        chunk
    }

    /// Diagnostic snapshot; `listeners` comes from the registry.
    pub fn status(&self, listeners: usize) -> SourceStatus {
        let chunk_ms = self.store.chunk_duration_ms() as u64;
        SourceStatus {
            interval_id: self.interval_id.clone(),
            loop_count: self.loop_count,
            current_position: self.position,
            total_chunks: self.total_chunks(),
            elapsed_ms: self.position as u64 * chunk_ms,
            total_duration_ms: self.store.total_duration_ms(),
            chunk_duration_ms: chunk_ms,
            audio_format: self.store.format(),
            listeners,
        }
    }
}

fn new_interval_id() -> String {
    Uuid::new_v4().to_string()
}

/// Emit one chunk per `period` until `shutdown` fires.
pub async fn run_generation_loop(
    ctx: Arc<SourceContext>,
    period: Duration,
    warmup: Duration,
    shutdown: CancellationToken,
) {
    if !warmup.is_zero() {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(warmup) => {}
        }
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(
        period_ms = period.as_millis() as u64,
        total_chunks = ctx.store.len(),
        "generation loop started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        let (chunk, report) = ctx.emit_next(now_millis());
        if report.dropped > 0 {
            tracing::debug!(
                position = chunk.position,
                dropped = report.dropped,
                "slow listeners skipped a chunk"
            );
        }
    }

    tracing::info!("generation loop stopped");
}
