//! Looping audio source.
//!
//! Decodes one WAV file into fixed-duration chunks and streams them forever,
//! in order, to every connected listener over server-sent events.

pub mod api;
pub mod chunk_store;
pub mod config;
pub mod generator;
pub mod openapi;
pub mod startup;
pub mod state;

pub use chunk_store::{ChunkStore, DecodeError};
pub use config::{SourceConfig, SourceSettings};
pub use generator::{LoopGenerator, run_generation_loop};
pub use state::SourceContext;
