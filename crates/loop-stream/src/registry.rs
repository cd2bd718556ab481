//! Consumer sessions and their bounded outbound queues.
//!
//! Writers (broadcast loop, relay fast path, playback scheduler) never block:
//! each delivery is a `try_send`, and a full queue drops the newest record for
//! that consumer only. Fan-out always works on a snapshot taken under the read
//! lock so no lock is held while records are pushed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use loop_types::MAX_DELAY_MS;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default per-consumer queue depth (about one second at a 100 ms tick).
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

const NO_CURSOR: u64 = u64::MAX;

/// Clamp a requested delay into `0..=MAX_DELAY_MS`.
pub fn clamp_delay_ms(requested: i64) -> u32 {
    requested.clamp(0, MAX_DELAY_MS as i64) as u32
}

/// Outcome of offering one record to one consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Record queued.
    Sent,
    /// Queue full; the record was dropped.
    Full,
    /// Consumer is gone; the record was dropped.
    Closed,
}

/// Counters from one fan-out pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub sent: usize,
    pub dropped: usize,
    pub closed: usize,
}

impl FanOutReport {
    pub fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Sent => self.sent += 1,
            Delivery::Full => self.dropped += 1,
            Delivery::Closed => self.closed += 1,
        }
    }
}

/// One connected consumer.
pub struct ConsumerSession<T> {
    id: u64,
    delay_ms: AtomicU32,
    last_delivered: AtomicU64,
    closed: AtomicBool,
    sender: mpsc::Sender<T>,
}

impl<T> ConsumerSession<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Currently configured playback delay.
    pub fn delay_ms(&self) -> u32 {
        self.delay_ms.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// Push a record without waiting.
    pub fn offer(&self, record: T) -> Delivery {
        if self.closed.load(Ordering::Acquire) {
            return Delivery::Closed;
        }
        match self.sender.try_send(record) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Advance the delivery cursor to `seq`.
    ///
    /// Returns `false` when `seq` was already the last delivered sequence.
    pub fn mark_delivered(&self, seq: u64) -> bool {
        self.last_delivered.swap(seq, Ordering::AcqRel) != seq
    }

    /// Sequence of the last record handed to this consumer, if any.
    pub fn last_delivered(&self) -> Option<u64> {
        match self.last_delivered.load(Ordering::Acquire) {
            NO_CURSOR => None,
            seq => Some(seq),
        }
    }
}

/// Registry of consumer sessions keyed by a monotonically increasing id.
pub struct ConsumerRegistry<T> {
    sessions: RwLock<HashMap<u64, Arc<ConsumerSession<T>>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl<T> ConsumerRegistry<T> {
    /// Create a registry whose sessions get queues of `queue_capacity` records.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Register a new consumer with a clamped initial delay.
    ///
    /// The returned [`Subscription`] unsubscribes when dropped.
    pub fn subscribe(self: &Arc<Self>, initial_delay_ms: i64) -> Subscription<T> {
        let delay_ms = clamp_delay_ms(initial_delay_ms);
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(ConsumerSession {
            id,
            delay_ms: AtomicU32::new(delay_ms),
            last_delivered: AtomicU64::new(NO_CURSOR),
            closed: AtomicBool::new(false),
            sender,
        });
        let total = {
            let mut sessions = self.sessions.write().unwrap_or_else(|err| err.into_inner());
            sessions.insert(id, session);
            sessions.len()
        };
        tracing::info!(client_id = id, delay_ms, total, "consumer connected");
        Subscription {
            id,
            delay_ms,
            receiver,
            registry: Arc::clone(self),
        }
    }

    /// Close and remove a consumer. Returns `false` for unknown ids.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let (removed, total) = {
            let mut sessions = self.sessions.write().unwrap_or_else(|err| err.into_inner());
            let removed = sessions.remove(&id);
            (removed, sessions.len())
        };
        match removed {
            Some(session) => {
                session.closed.store(true, Ordering::Release);
                tracing::info!(client_id = id, total, "consumer disconnected");
                true
            }
            None => false,
        }
    }

    /// Update a consumer's delay. Returns the applied (clamped) value.
    pub fn set_delay(&self, id: u64, delay_ms: i64) -> Option<u32> {
        let applied = clamp_delay_ms(delay_ms);
        let sessions = self.sessions.write().unwrap_or_else(|err| err.into_inner());
        let session = sessions.get(&id)?;
        session.delay_ms.store(applied, Ordering::Release);
        tracing::info!(client_id = id, delay_ms = applied, "consumer delay updated");
        Some(applied)
    }

    /// Fetch one session.
    pub fn get(&self, id: u64) -> Option<Arc<ConsumerSession<T>>> {
        self.sessions
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(&id)
            .cloned()
    }

    /// Point-in-time copy of all sessions, ordered by id.
    pub fn snapshot(&self) -> Vec<Arc<ConsumerSession<T>>> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .values()
            .cloned()
            .collect();
        sessions.sort_by_key(|session| session.id);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|err| err.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> ConsumerRegistry<T> {
    /// Offer a copy of `record` to every registered consumer.
    pub fn broadcast(&self, record: &T) -> FanOutReport {
        let mut report = FanOutReport::default();
        for session in self.snapshot() {
            let delivery = session.offer(record.clone());
            if delivery == Delivery::Full {
                tracing::debug!(client_id = session.id(), "queue full; dropping record");
            }
            report.record(delivery);
        }
        report
    }
}

/// Receiving half of a consumer session.
pub struct Subscription<T> {
    id: u64,
    delay_ms: u32,
    receiver: mpsc::Receiver<T>,
    registry: Arc<ConsumerRegistry<T>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Delay applied at subscribe time.
    pub fn initial_delay_ms(&self) -> u32 {
        self.delay_ms
    }

    /// Wait for the next queued record. `None` once the session is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take a queued record without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.receiver.close();
        self.registry.unsubscribe(self.id);
    }
}
