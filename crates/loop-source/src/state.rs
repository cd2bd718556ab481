use std::sync::{Arc, Mutex};

use loop_stream::{ConsumerRegistry, FanOutReport};
use loop_types::{Chunk, SourceStatus};

use crate::chunk_store::ChunkStore;
use crate::generator::LoopGenerator;

/// Shared producer state: the decoded loop, its cursor and the connected listeners.
pub struct SourceContext {
    pub store: Arc<ChunkStore>,
    pub generator: Mutex<LoopGenerator>,
    pub listeners: Arc<ConsumerRegistry<Arc<Chunk>>>,
}

impl SourceContext {
    pub fn new(store: Arc<ChunkStore>, queue_capacity: usize) -> Self {
        Self {
            generator: Mutex::new(LoopGenerator::new(Arc::clone(&store))),
            store,
            listeners: Arc::new(ConsumerRegistry::new(queue_capacity)),
        }
    }

    /// Generate the next chunk and offer it to every listener.
    pub fn emit_next(&self, now_ms: i64) -> (Arc<Chunk>, FanOutReport) {
        let chunk = self
            .generator
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .next_chunk(now_ms);
        let report = self.listeners.broadcast(&chunk);
        (chunk, report)
    }

    pub fn status(&self) -> SourceStatus {
        let listeners = self.listeners.len();
        self.generator
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .status(listeners)
    }
}
