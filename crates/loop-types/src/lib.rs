//! Wire records shared by the loop source and the delay relay.
//!
//! Two record kinds travel over the event streams:
//! - [`Chunk`]: emitted by the source, one per generation tick.
//! - [`DeliveryRecord`]: a chunk decorated by the relay for a specific consumer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod hex;

/// Longest playback delay a consumer may request, in milliseconds.
pub const MAX_DELAY_MS: u32 = 15_000;

/// PCM layout mirrored into every chunk record.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AudioFormat {
    /// Interleaved channel count.
    pub channels: u16,
    /// Sample rate (Hz).
    pub sample_rate: u32,
    /// Bits per sample (sample width × 8).
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Sample width in bytes.
    pub fn sample_width(&self) -> u16 {
        self.bits_per_sample / 8
    }

    /// Bytes needed for one second of audio.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * self.sample_width() as u64
    }
}

/// One fixed-duration slice of looping audio plus generation metadata.
///
/// Chunks are built once per tick and shared read-only behind an [`Arc`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Identifies one full pass over the loop.
    pub interval_id: String,
    /// Number of completed loop passes before this chunk.
    pub loop_count: u64,
    /// Index of this chunk within the loop.
    pub position: u32,
    /// Chunks per loop pass.
    pub total_chunks: u32,
    /// Source wall clock at emission (ms since epoch).
    pub timestamp: i64,
    /// Raw little-endian PCM, hex encoded on the wire.
    #[serde(with = "hex")]
    pub audio: Arc<[u8]>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes per sample.
    pub sample_width: u16,
    pub audio_format: AudioFormat,
}

/// Delay buffer occupancy reported alongside relay deliveries.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BufferStats {
    /// Number of buffered chunks.
    pub size: usize,
    /// Seconds spanned between the oldest and newest buffered chunk.
    pub duration: f64,
    /// Seconds since the oldest buffered chunk was received.
    pub oldest_age: f64,
}

/// A chunk as delivered by the relay to one consumer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeliveryRecord {
    #[serde(flatten)]
    pub chunk: Arc<Chunk>,
    pub relay_id: String,
    /// Relay wall clock at send time (ms since epoch).
    pub relay_timestamp: i64,
    /// Source timestamp of the delivered chunk.
    pub source_timestamp: i64,
    /// Delay the consumer asked for.
    pub configured_delay_ms: u32,
    /// `relay_timestamp - source_timestamp`; negative values indicate clock skew.
    pub actual_delay_ms: i64,
    pub buffer_stats: BufferStats,
}

/// First record on a relay consumer stream.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConsumerHello {
    /// Id to use with delay updates.
    pub client_id: u64,
    /// Delay applied after clamping.
    pub delay_ms: u32,
}

/// Body of a delay update request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SetDelayRequest {
    pub client_id: u64,
    /// Requested delay; values outside `0..=15000` are clamped.
    pub delay_ms: i64,
}

/// Acknowledgement of a delay update.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SetDelayResponse {
    pub status: String,
    pub client_id: u64,
    /// Delay actually applied.
    pub delay_ms: u32,
}

/// Upstream connection phase of the relay ingest loop.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum IngestPhase {
    #[default]
    Disconnected,
    Connecting,
    Streaming,
}

/// Last source metadata seen by the relay.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SourceSnapshot {
    pub source_interval_id: String,
    pub source_loop_count: u64,
    pub source_position: u32,
    pub total_chunks: u32,
    pub audio_format: AudioFormat,
    /// Source timestamp of the last chunk.
    pub source_timestamp: i64,
    /// Relay wall clock when the last chunk arrived.
    pub received_at_ms: i64,
}

impl SourceSnapshot {
    /// Build a snapshot from an ingested chunk.
    pub fn from_chunk(chunk: &Chunk, received_at_ms: i64) -> Self {
        Self {
            source_interval_id: chunk.interval_id.clone(),
            source_loop_count: chunk.loop_count,
            source_position: chunk.position,
            total_chunks: chunk.total_chunks,
            audio_format: chunk.audio_format,
            source_timestamp: chunk.timestamp,
            received_at_ms,
        }
    }
}

/// Relay diagnostics returned by `GET /status`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RelayStatus {
    pub relay_id: String,
    pub source_url: String,
    /// `true` while the upstream event stream is open.
    pub is_connected: bool,
    pub phase: IngestPhase,
    /// Connection attempts made since startup.
    pub connect_attempts: u64,
    /// Connected consumers.
    pub listeners: usize,
    pub buffer_stats: BufferStats,
    pub current_state: Option<SourceSnapshot>,
}

/// Source diagnostics returned by `GET /status` and sent first on `/stream`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SourceStatus {
    pub interval_id: String,
    pub loop_count: u64,
    /// Next position to be emitted.
    pub current_position: u32,
    pub total_chunks: u32,
    /// Time since the current loop pass started.
    pub elapsed_ms: u64,
    pub total_duration_ms: u64,
    pub chunk_duration_ms: u64,
    pub audio_format: AudioFormat,
    pub listeners: usize,
}

/// Liveness payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> Chunk {
        Chunk {
            interval_id: "b5d7".to_string(),
            loop_count: 3,
            position: 7,
            total_chunks: 20,
            timestamp: 1_700_000_000_123,
            audio: Arc::from(vec![0x01, 0x00, 0xff, 0x7f]),
            sample_rate: 44_100,
            channels: 1,
            sample_width: 2,
            audio_format: AudioFormat {
                channels: 1,
                sample_rate: 44_100,
                bits_per_sample: 16,
            },
        }
    }

    #[test]
    fn chunk_serializes_audio_as_hex() {
        let value = serde_json::to_value(sample_chunk()).unwrap();
        assert_eq!(value["audio"], "0100ff7f");
        assert_eq!(value["audio_format"]["bits_per_sample"], 16);
        assert_eq!(value["position"], 7);
    }

    #[test]
    fn chunk_parses_source_record() {
        let raw = r#"{"interval_id":"abc","loop_count":1,"position":0,"total_chunks":20,
            "timestamp":1700000000000,"audio":"0a0B","sample_rate":48000,"channels":2,
            "sample_width":2,"audio_format":{"channels":2,"sample_rate":48000,"bits_per_sample":16}}"#;
        let chunk: Chunk = serde_json::from_str(raw).unwrap();
        assert_eq!(&chunk.audio[..], &[0x0a, 0x0b]);
        assert_eq!(chunk.audio_format.sample_width(), 2);
        assert_eq!(chunk.audio_format.byte_rate(), 192_000);
    }

    #[test]
    fn chunk_rejects_missing_fields() {
        let raw = r#"{"interval_id":"abc","loop_count":1}"#;
        assert!(serde_json::from_str::<Chunk>(raw).is_err());
    }

    #[test]
    fn delivery_record_flattens_chunk_fields() {
        let record = DeliveryRecord {
            chunk: Arc::new(sample_chunk()),
            relay_id: "relay-buffered".to_string(),
            relay_timestamp: 1_700_000_000_223,
            source_timestamp: 1_700_000_000_123,
            configured_delay_ms: 0,
            actual_delay_ms: 100,
            buffer_stats: BufferStats {
                size: 4,
                duration: 0.3,
                oldest_age: 0.4,
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["interval_id"], "b5d7");
        assert_eq!(value["timestamp"], 1_700_000_000_123i64);
        assert_eq!(value["actual_delay_ms"], 100);
        assert_eq!(value["buffer_stats"]["size"], 4);

        let back: DeliveryRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn ingest_phase_uses_snake_case() {
        let value = serde_json::to_value(IngestPhase::Streaming).unwrap();
        assert_eq!(value, "streaming");
    }
}
