//! Delay relay for a looping audio source.
//!
//! Keeps one upstream event stream open, remembers the last few seconds of
//! chunks and replays them to each consumer at that consumer's chosen delay.

pub mod api;
pub mod config;
pub mod delay_buffer;
pub mod delivery;
pub mod ingest;
pub mod openapi;
pub mod scheduler;
pub mod startup;
pub mod state;

pub use config::{RelayConfig, RelaySettings};
pub use delay_buffer::{BufferEntry, DelayBuffer};
pub use ingest::{IngestError, run_ingest_loop};
pub use scheduler::{TickReport, run_playback_scheduler};
pub use state::{RelayContext, UpstreamState};
