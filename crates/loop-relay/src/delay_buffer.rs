//! Time-indexed history of ingested chunks.
//!
//! Entries are appended by the ingest loop only, in arrival order, and keep a
//! `relative_time` measured from the first append. Lookups resolve a playback
//! delay into the first entry at or after `now - delay`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use loop_types::{BufferStats, Chunk};

/// One buffered chunk with its arrival metadata.
#[derive(Clone, Debug)]
pub struct BufferEntry {
    /// Insertion sequence, unique for the lifetime of the buffer.
    pub seq: u64,
    pub chunk: Arc<Chunk>,
    pub received_at: Instant,
    /// Relay wall clock at arrival (ms since epoch).
    pub received_ms: i64,
    /// Arrival time relative to the first append; never decreases.
    pub relative_time: Duration,
}

/// Bounded ring of recent chunks.
#[derive(Debug)]
pub struct DelayBuffer {
    entries: VecDeque<BufferEntry>,
    capacity: usize,
    start: Option<Instant>,
    next_seq: u64,
}

impl DelayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            start: None,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest entry, if any.
    pub fn newest(&self) -> Option<&BufferEntry> {
        self.entries.back()
    }

    /// Oldest retained entry, if any.
    pub fn oldest(&self) -> Option<&BufferEntry> {
        self.entries.front()
    }

    /// Append a chunk that arrived at `now`, evicting the oldest entry when full.
    ///
    /// Returns the entry's sequence number.
    pub fn append(&mut self, chunk: Arc<Chunk>, now: Instant, now_ms: i64) -> u64 {
        let start = *self.start.get_or_insert(now);
        let mut relative_time = now.saturating_duration_since(start);
        if let Some(last) = self.entries.back() {
            relative_time = relative_time.max(last.relative_time);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(BufferEntry {
            seq,
            chunk,
            received_at: now,
            received_ms: now_ms,
            relative_time,
        });
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        seq
    }

    /// Entry due for playback `delay_ms` behind `now`.
    ///
    /// - zero delay resolves to the newest entry
    /// - a delay longer than the history since the first append resolves to nothing
    /// - otherwise the first entry with `relative_time >= now - delay`, which is
    ///   the oldest entry when the target predates the retained window and nothing
    ///   when ingest has stalled past the target
    pub fn lookup(&self, delay_ms: u32, now: Instant) -> Option<BufferEntry> {
        if delay_ms == 0 {
            return self.entries.back().cloned();
        }
        let start = self.start?;
        let current = now.saturating_duration_since(start);
        let target = current.checked_sub(Duration::from_millis(delay_ms as u64))?;
        let index = self.entries.partition_point(|entry| entry.relative_time < target);
        self.entries.get(index).cloned()
    }

    /// Occupancy as seen at `now`.
    pub fn stats_at(&self, now: Instant) -> BufferStats {
        match (self.entries.front(), self.entries.back()) {
            (Some(oldest), Some(newest)) => BufferStats {
                size: self.entries.len(),
                duration: (newest.relative_time - oldest.relative_time).as_secs_f64(),
                oldest_age: now.saturating_duration_since(oldest.received_at).as_secs_f64(),
            },
            _ => BufferStats::default(),
        }
    }

    pub fn stats(&self) -> BufferStats {
        self.stats_at(Instant::now())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::chunk;
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Buffer filled with `count` chunks arriving every 100 ms from `base`.
    fn filled(capacity: usize, count: u32, base: Instant) -> DelayBuffer {
        let mut buffer = DelayBuffer::new(capacity);
        for n in 0..count {
            buffer.append(chunk(n, n as i64 * 100), base + ms(n as u64 * 100), n as i64 * 100);
        }
        buffer
    }

    #[test]
    fn empty_buffer_resolves_nothing() {
        let buffer = DelayBuffer::new(10);
        assert!(buffer.lookup(0, Instant::now()).is_none());
        assert!(buffer.lookup(500, Instant::now()).is_none());
        assert_eq!(buffer.stats(), BufferStats::default());
    }

    #[test]
    fn capacity_is_never_exceeded_and_oldest_is_evicted() {
        let base = Instant::now();
        let buffer = filled(200, 250, base);
        assert_eq!(buffer.len(), 200);
        assert_eq!(buffer.oldest().unwrap().seq, 50);
        assert_eq!(buffer.newest().unwrap().seq, 249);
    }

    #[test]
    fn relative_times_are_non_decreasing() {
        let base = Instant::now();
        let mut buffer = DelayBuffer::new(10);
        buffer.append(chunk(0, 0), base + ms(500), 0);
        buffer.append(chunk(1, 0), base + ms(300), 0);
        buffer.append(chunk(2, 0), base + ms(900), 0);
        let times: Vec<_> = buffer.entries.iter().map(|e| e.relative_time).collect();
        assert_eq!(times, vec![ms(0), ms(0), ms(400)]);
    }

    #[test]
    fn zero_delay_is_newest() {
        let base = Instant::now();
        let buffer = filled(10, 5, base);
        let entry = buffer.lookup(0, base + ms(10_000)).unwrap();
        assert_eq!(entry.chunk.position, 4);
    }

    #[test]
    fn lookup_is_nearest_forward() {
        let base = Instant::now();
        let buffer = filled(100, 11, base);
        let now = base + ms(1_000);
        // target 650 ms -> first entry at or after it is the 700 ms arrival
        assert_eq!(buffer.lookup(350, now).unwrap().chunk.position, 7);
        // exact hit
        assert_eq!(buffer.lookup(300, now).unwrap().chunk.position, 7);
        assert_eq!(buffer.lookup(1_000, now).unwrap().chunk.position, 0);
    }

    #[test]
    fn delay_beyond_history_starves() {
        let base = Instant::now();
        let buffer = filled(100, 11, base);
        assert!(buffer.lookup(1_500, base + ms(1_000)).is_none());
    }

    #[test]
    fn target_before_retained_window_returns_oldest() {
        let base = Instant::now();
        let buffer = filled(5, 20, base);
        // retained arrivals are 1500..=1900 ms; target 100 ms predates them
        let entry = buffer.lookup(1_800, base + ms(1_900)).unwrap();
        assert_eq!(entry.seq, 15);
    }

    #[test]
    fn stalled_ingest_starves_delayed_lookups() {
        let base = Instant::now();
        let buffer = filled(100, 10, base);
        // last arrival at 900 ms; ten seconds later a 2 s delay targets 8 s
        assert!(buffer.lookup(2_000, base + ms(10_000)).is_none());
        assert!(buffer.lookup(0, base + ms(10_000)).is_some());
    }

    #[test]
    fn five_second_delay_tracks_arrivals_within_a_tick() {
        let base = Instant::now();
        let buffer = filled(200, 100, base);
        for now_ms in (5_000..=9_900).step_by(100) {
            let entry = buffer.lookup(5_000, base + ms(now_ms)).unwrap();
            let lag = now_ms - entry.relative_time.as_millis() as u64;
            assert!((4_900..=5_000).contains(&lag), "lag {lag} at {now_ms}");
        }
    }

    #[test]
    fn stats_report_span_and_age() {
        let base = Instant::now();
        let buffer = filled(10, 4, base);
        let stats = buffer.stats_at(base + ms(1_000));
        assert_eq!(stats.size, 4);
        assert!((stats.duration - 0.3).abs() < 1e-9);
        assert!((stats.oldest_age - 1.0).abs() < 1e-9);
    }
}
