//! Shared streaming plumbing for the loop source and the delay relay.
//!
//! - [`registry`]: consumer sessions with bounded, drop-newest queues.
//! - [`sse`]: server-sent event framing and incremental decoding.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod registry;
pub mod sse;

pub use registry::{ConsumerRegistry, ConsumerSession, Delivery, FanOutReport, Subscription};

/// Wall clock in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
