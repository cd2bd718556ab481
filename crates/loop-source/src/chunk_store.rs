//! WAV loading and chunking.
//!
//! The container is parsed once at startup:
//! - `RIFF....WAVE` signature
//! - blocks walked in file order, unknown blocks skipped (honouring the pad byte)
//! - `fmt ` must appear before the `data` block that is used
//!
//! Sample data is then cut into equal-size chunks; the tail is zero-padded so
//! every chunk plays for exactly the configured duration.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use loop_types::AudioFormat;
use thiserror::Error;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Errors while loading the audio container. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("not a RIFF/WAVE file")]
    BadSignature,

    #[error("fmt block not found")]
    MissingFormat,

    #[error("data block not found")]
    MissingData,

    #[error("data block appears before fmt block")]
    DataBeforeFormat,

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("no audio samples in data block")]
    Empty,
}

#[derive(Clone, Copy, Debug)]
struct FormatBlock {
    format_code: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Decoded audio split into equal-duration chunks.
#[derive(Debug)]
pub struct ChunkStore {
    chunks: Vec<Arc<[u8]>>,
    format: AudioFormat,
    chunk_duration_ms: u32,
    chunk_size: usize,
}

impl ChunkStore {
    /// Load and chunk a WAV file from disk.
    pub fn load(path: &Path, chunk_duration_ms: u32) -> Result<Self, DecodeError> {
        let file = File::open(path)?;
        let store = Self::from_reader(BufReader::new(file), chunk_duration_ms)?;
        tracing::info!(
            path = %path.display(),
            channels = store.format.channels,
            rate_hz = store.format.sample_rate,
            bits = store.format.bits_per_sample,
            chunks = store.len(),
            total_ms = store.total_duration_ms(),
            "loaded audio"
        );
        Ok(store)
    }

    /// Parse a WAV container from any seekable reader.
    pub fn from_reader<R: Read + Seek>(
        mut reader: R,
        chunk_duration_ms: u32,
    ) -> Result<Self, DecodeError> {
        let mut header = [0u8; 12];
        reader.read_exact(&mut header)?;
        if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
            return Err(DecodeError::BadSignature);
        }

        let mut format: Option<FormatBlock> = None;
        let mut data_before_format = false;
        let data = loop {
            let Some((id, size)) = read_block_header(&mut reader)? else {
                return Err(if format.is_none() {
                    DecodeError::MissingFormat
                } else if data_before_format {
                    DecodeError::DataBeforeFormat
                } else {
                    DecodeError::MissingData
                });
            };
            match &id {
                b"fmt " => {
                    format = Some(read_format_block(&mut reader, size)?);
                }
                b"data" if format.is_some() => {
                    let mut data = vec![0u8; size as usize];
                    reader.read_exact(&mut data)?;
                    break data;
                }
                b"data" => {
                    tracing::debug!(size, "skipping data block that precedes fmt");
                    data_before_format = true;
                    skip_block(&mut reader, size as u64)?;
                }
                other => {
                    tracing::debug!(
                        block = %String::from_utf8_lossy(other),
                        size,
                        "skipping unknown block"
                    );
                    skip_block(&mut reader, size as u64)?;
                }
            }
        };

        let Some(fmt) = format else {
            return Err(DecodeError::MissingFormat);
        };
        if fmt.format_code != WAVE_FORMAT_PCM && fmt.format_code != WAVE_FORMAT_EXTENSIBLE {
            tracing::warn!(
                format_code = fmt.format_code,
                "non-PCM format code; sample data is forwarded as-is"
            );
        }
        let format = AudioFormat {
            channels: fmt.channels,
            sample_rate: fmt.sample_rate,
            bits_per_sample: fmt.bits_per_sample,
        };
        let chunk_size = chunk_size_for(&format, chunk_duration_ms);
        if chunk_size == 0 {
            return Err(DecodeError::InvalidFormat(format!(
                "chunk duration {chunk_duration_ms}ms yields empty chunks"
            )));
        }
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }

        Ok(Self {
            chunks: split_into_chunks(&data, chunk_size),
            format,
            chunk_duration_ms,
            chunk_size,
        })
    }

    /// Number of chunks in one loop pass (never zero).
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk at `index`, wrapping past the end.
    pub fn chunk(&self, index: usize) -> &Arc<[u8]> {
        &self.chunks[index % self.chunks.len()]
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn chunk_duration_ms(&self) -> u32 {
        self.chunk_duration_ms
    }

    /// Bytes per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Duration of one loop pass.
    pub fn total_duration_ms(&self) -> u64 {
        self.chunks.len() as u64 * self.chunk_duration_ms as u64
    }
}

/// Chunk size in bytes for a format and duration, rounded up to an even count.
pub fn chunk_size_for(format: &AudioFormat, chunk_duration_ms: u32) -> usize {
    let bytes = format.byte_rate() * chunk_duration_ms as u64 / 1000;
    let bytes = bytes as usize;
    if bytes % 2 == 0 { bytes } else { bytes + 1 }
}

/// Split sample data into `chunk_size` pieces, zero-padding the last one.
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Vec<Arc<[u8]>> {
    data.chunks(chunk_size)
        .map(|piece| {
            if piece.len() == chunk_size {
                Arc::from(piece)
            } else {
                let mut padded = vec![0u8; chunk_size];
                padded[..piece.len()].copy_from_slice(piece);
                Arc::from(padded)
            }
        })
        .collect()
}

/// Read an 8-byte block header. `None` at end of input.
fn read_block_header<R: Read>(reader: &mut R) -> Result<Option<([u8; 4], u32)>, DecodeError> {
    let mut raw = [0u8; 8];
    match reader.read_exact(&mut raw) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let id = [raw[0], raw[1], raw[2], raw[3]];
    let size = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
    Ok(Some((id, size)))
}

fn read_format_block<R: Read + Seek>(reader: &mut R, size: u32) -> Result<FormatBlock, DecodeError> {
    if size < 16 {
        return Err(DecodeError::InvalidFormat(format!("fmt block too short ({size} bytes)")));
    }
    let mut raw = [0u8; 16];
    reader.read_exact(&mut raw)?;
    let fmt = FormatBlock {
        format_code: u16::from_le_bytes([raw[0], raw[1]]),
        channels: u16::from_le_bytes([raw[2], raw[3]]),
        sample_rate: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        bits_per_sample: u16::from_le_bytes([raw[14], raw[15]]),
    };
    skip_block(reader, (size - 16) as u64)?;

    if fmt.channels == 0 {
        return Err(DecodeError::InvalidFormat("zero channels".to_string()));
    }
    if fmt.sample_rate == 0 {
        return Err(DecodeError::InvalidFormat("zero sample rate".to_string()));
    }
    if fmt.bits_per_sample == 0 || fmt.bits_per_sample % 8 != 0 {
        return Err(DecodeError::InvalidFormat(format!(
            "unsupported bits per sample {}",
            fmt.bits_per_sample
        )));
    }
    Ok(fmt)
}

/// Skip a block body plus its pad byte when the size is odd.
fn skip_block<R: Seek>(reader: &mut R, size: u64) -> io::Result<()> {
    let padded = size + (size % 2);
    if padded > 0 {
        reader.seek(SeekFrom::Current(padded as i64))?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::test_support::{pcm_wav, store};
    use super::*;

    fn block(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn fmt_body(channels: u16, rate: u32, bits: u16) -> Vec<u8> {
        let align = channels * bits / 8;
        let mut body = Vec::new();
        body.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&rate.to_le_bytes());
        body.extend_from_slice(&(rate * align as u32).to_le_bytes());
        body.extend_from_slice(&align.to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        body
    }

    fn riff(blocks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = blocks.concat();
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32 + 4).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&body);
        out
    }

    fn parse(bytes: Vec<u8>, chunk_ms: u32) -> Result<ChunkStore, DecodeError> {
        ChunkStore::from_reader(Cursor::new(bytes), chunk_ms)
    }

    #[test]
    fn two_second_mono_loop_has_twenty_chunks() {
        let store = store(44_100, 1, 88_200, 100);
        assert_eq!(store.len(), 20);
        assert_eq!(store.chunk_size(), 8_820);
        assert_eq!(store.total_duration_ms(), 2_000);
        assert_eq!(store.format().sample_width(), 2);
    }

    #[test]
    fn chunk_count_is_ceiling_and_tail_is_zero_padded() {
        // 1000 frames of 8 kHz mono 16-bit = 2000 bytes; 100 ms chunks = 1600 bytes.
        let store = store(8_000, 1, 1_000, 100);
        assert_eq!(store.chunk_size(), 1_600);
        assert_eq!(store.len(), 2);
        let tail = store.chunk(1);
        assert_eq!(tail.len(), 1_600);
        assert!(tail[400..].iter().all(|b| *b == 0));
        assert!(tail[..400].iter().any(|b| *b != 0));
    }

    #[test]
    fn split_matches_ceiling_for_many_sizes() {
        for (len, size) in [(1usize, 2usize), (10, 4), (12, 4), (8_821, 8_820), (100, 100)] {
            let data = vec![1u8; len];
            let chunks = split_into_chunks(&data, size);
            assert_eq!(chunks.len(), len.div_ceil(size));
            assert!(chunks.iter().all(|c| c.len() == size));
        }
    }

    #[test]
    fn chunk_size_rounds_up_to_even() {
        let format = AudioFormat { channels: 1, sample_rate: 11_025, bits_per_sample: 8 };
        // 11025 * 1 * 1 * 100 / 1000 = 1102.5 -> 1102 (even)
        assert_eq!(chunk_size_for(&format, 100), 1_102);
        // 11025 * 10 / 1000 = 110.25 -> 110
        assert_eq!(chunk_size_for(&format, 10), 110);
        let format = AudioFormat { channels: 1, sample_rate: 1_000, bits_per_sample: 8 };
        assert_eq!(chunk_size_for(&format, 3), 4);
    }

    #[test]
    fn chunk_lookup_wraps() {
        let store = store(8_000, 1, 1_000, 100);
        assert!(Arc::ptr_eq(store.chunk(0), store.chunk(2)));
    }

    #[test]
    fn tolerates_unknown_blocks_and_reordering() {
        let data = vec![7u8; 3_200];
        let bytes = riff(&[
            block(b"LIST", b"odd"),
            block(b"fmt ", &fmt_body(1, 8_000, 16)),
            block(b"fact", &[0, 0, 0, 0]),
            block(b"data", &data),
        ]);
        let store = parse(bytes, 100).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.format().sample_rate, 8_000);
    }

    #[test]
    fn extended_fmt_block_is_skipped() {
        let mut fmt = fmt_body(2, 8_000, 16);
        fmt.extend_from_slice(&[0u8; 2]);
        let bytes = riff(&[block(b"fmt ", &fmt), block(b"data", &[1u8; 64])]);
        let store = parse(bytes, 100).unwrap();
        assert_eq!(store.format().channels, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn hound_output_round_trips_sample_bytes() {
        let bytes = pcm_wav(8_000, 1, 800);
        let store = parse(bytes, 100).unwrap();
        assert_eq!(&store.chunk(0)[0..4], &[0, 0, 1, 0]);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = pcm_wav(8_000, 1, 10);
        bytes[8..12].copy_from_slice(b"AVI ");
        assert!(matches!(parse(bytes, 100), Err(DecodeError::BadSignature)));
    }

    #[test]
    fn rejects_missing_blocks() {
        let only_fmt = riff(&[block(b"fmt ", &fmt_body(1, 8_000, 16))]);
        assert!(matches!(parse(only_fmt, 100), Err(DecodeError::MissingData)));

        let only_data = riff(&[block(b"junk", &[1, 2]), block(b"LIST", &[])]);
        assert!(matches!(parse(only_data, 100), Err(DecodeError::MissingFormat)));
    }

    #[test]
    fn rejects_data_before_format() {
        let bytes = riff(&[
            block(b"data", &[1u8; 32]),
            block(b"fmt ", &fmt_body(1, 8_000, 16)),
        ]);
        assert!(matches!(parse(bytes, 100), Err(DecodeError::DataBeforeFormat)));
    }

    #[test]
    fn rejects_invalid_format_and_empty_data() {
        let zero_channels = riff(&[block(b"fmt ", &fmt_body(0, 8_000, 16)), block(b"data", &[1; 4])]);
        assert!(matches!(parse(zero_channels, 100), Err(DecodeError::InvalidFormat(_))));

        let short = riff(&[block(b"fmt ", &[1, 0, 1, 0]), block(b"data", &[1; 4])]);
        assert!(matches!(parse(short, 100), Err(DecodeError::InvalidFormat(_))));

        let empty = riff(&[block(b"fmt ", &fmt_body(1, 8_000, 16)), block(b"data", &[])]);
        assert!(matches!(parse(empty, 100), Err(DecodeError::Empty)));

        let tiny_chunks = riff(&[block(b"fmt ", &fmt_body(1, 8_000, 16)), block(b"data", &[1; 4])]);
        assert!(matches!(parse(tiny_chunks, 0), Err(DecodeError::InvalidFormat(_))));
    }

    #[test]
    fn truncated_data_is_an_io_error() {
        let mut bytes = riff(&[block(b"fmt ", &fmt_body(1, 8_000, 16)), block(b"data", &[1u8; 64])]);
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(parse(bytes, 100), Err(DecodeError::Io(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let path = std::env::temp_dir().join("loop-source-does-not-exist.wav");
        assert!(matches!(ChunkStore::load(&path, 100), Err(DecodeError::Io(_))));
    }
}
