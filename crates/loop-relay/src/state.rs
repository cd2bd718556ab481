//! Shared relay state.
//!
//! One [`RelayContext`] is built at startup and shared by the ingest loop, the
//! playback scheduler and the HTTP handlers.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use loop_stream::ConsumerRegistry;
use loop_types::{BufferStats, Chunk, DeliveryRecord, IngestPhase, RelayStatus, SourceSnapshot};

use crate::config::RelaySettings;
use crate::delay_buffer::DelayBuffer;

/// Upstream connection bookkeeping, overwritten by the ingest loop.
#[derive(Debug, Default, Clone)]
pub struct UpstreamState {
    pub connected: bool,
    pub phase: IngestPhase,
    pub connect_attempts: u64,
    pub snapshot: Option<SourceSnapshot>,
}

pub struct RelayContext {
    pub settings: RelaySettings,
    pub buffer: RwLock<DelayBuffer>,
    pub consumers: Arc<ConsumerRegistry<DeliveryRecord>>,
    pub upstream: RwLock<UpstreamState>,
}

impl RelayContext {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            buffer: RwLock::new(DelayBuffer::new(settings.buffer_capacity)),
            consumers: Arc::new(ConsumerRegistry::new(settings.queue_capacity)),
            upstream: RwLock::new(UpstreamState::default()),
            settings,
        }
    }

    /// Start a connection attempt.
    pub fn mark_connecting(&self) {
        let mut upstream = self.upstream.write().unwrap_or_else(|err| err.into_inner());
        upstream.connected = false;
        upstream.phase = IngestPhase::Connecting;
        upstream.connect_attempts += 1;
    }

    pub fn mark_streaming(&self) {
        let mut upstream = self.upstream.write().unwrap_or_else(|err| err.into_inner());
        upstream.connected = true;
        upstream.phase = IngestPhase::Streaming;
    }

    pub fn mark_disconnected(&self) {
        let mut upstream = self.upstream.write().unwrap_or_else(|err| err.into_inner());
        upstream.connected = false;
        upstream.phase = IngestPhase::Disconnected;
    }

    pub fn is_connected(&self) -> bool {
        self.upstream.read().unwrap_or_else(|err| err.into_inner()).connected
    }

    pub fn upstream(&self) -> UpstreamState {
        self.upstream.read().unwrap_or_else(|err| err.into_inner()).clone()
    }

    /// Store an ingested chunk and refresh the source snapshot.
    ///
    /// Returns the buffer sequence assigned to the chunk and the buffer stats
    /// right after the append.
    pub fn record_chunk(&self, chunk: Arc<Chunk>, now: Instant, now_ms: i64) -> (u64, BufferStats) {
        let snapshot = SourceSnapshot::from_chunk(&chunk, now_ms);
        let (seq, stats) = {
            let mut buffer = self.buffer.write().unwrap_or_else(|err| err.into_inner());
            let seq = buffer.append(chunk, now, now_ms);
            (seq, buffer.stats_at(now))
        };
        self.upstream
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .snapshot = Some(snapshot);
        (seq, stats)
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.buffer.read().unwrap_or_else(|err| err.into_inner()).stats()
    }

    pub fn status(&self) -> RelayStatus {
        let upstream = self.upstream();
        RelayStatus {
            relay_id: self.settings.relay_id.clone(),
            source_url: self.settings.source_url.clone(),
            is_connected: upstream.connected,
            phase: upstream.phase,
            connect_attempts: upstream.connect_attempts,
            listeners: self.consumers.len(),
            buffer_stats: self.buffer_stats(),
            current_state: upstream.snapshot,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::{RelayConfig, RelaySettings};

    use super::RelayContext;

    /// Context with default settings, a short backoff and the given source URL.
    pub(crate) fn context_for(source_url: &str) -> RelayContext {
        let cfg = RelayConfig {
            source_url: Some(source_url.to_string()),
            reconnect_backoff_ms: Some(20),
            idle_timeout_ms: Some(2_000),
            connect_timeout_ms: Some(500),
            ..RelayConfig::default()
        };
        RelayContext::new(RelaySettings::resolve(&cfg).unwrap())
    }

    pub(crate) fn context() -> RelayContext {
        context_for("http://127.0.0.1:9")
    }
}
