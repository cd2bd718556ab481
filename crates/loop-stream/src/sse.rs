//! Server-sent event framing and incremental decoding.

/// Keep-alive comment frame.
pub const PING_FRAME: &str = ": ping\n\n";

/// Lines longer than this are discarded (protects against a peer that never sends `\n`).
const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Frame a payload as one SSE event; `event` of `None` produces a default `message` event.
pub fn sse_event(event: Option<&str>, data: &str) -> String {
    let mut payload = String::with_capacity(data.len() + 16);
    if let Some(event) = event {
        payload.push_str("event: ");
        payload.push_str(event);
        payload.push('\n');
    }
    for line in data.lines() {
        payload.push_str("data: ");
        payload.push_str(line);
        payload.push('\n');
    }
    payload.push('\n');
    payload
}

/// One decoded event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name, `None` for the default `message` event.
    pub event: Option<String>,
    /// Data lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// `true` for unnamed events and explicit `message` events.
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Incremental decoder fed with arbitrary byte slices from a response body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    discarding: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and collect every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    self.line.clear();
                    continue;
                }
                let mut raw = std::mem::take(&mut self.line);
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
                let line = String::from_utf8_lossy(&raw);
                if let Some(event) = self.handle_line(&line) {
                    events.push(event);
                }
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.line.len() >= MAX_LINE_BYTES {
                tracing::warn!(limit = MAX_LINE_BYTES, "sse line too long; discarding");
                self.line.clear();
                self.discarding = true;
                continue;
            }
            self.line.push(byte);
        }
        events
    }

    fn handle_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            let event = self.event.take();
            if self.data.is_empty() {
                return None;
            }
            let data = std::mem::take(&mut self.data).join("\n");
            return Some(SseEvent { event, data });
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }
}
