use serde_json::json;
use std::io::Write;

use crate::sync::{EventSink, SyncEvent};

/// Streams events of a running request as JSON lines tagged with the
/// request id, ahead of the request's final response.
pub struct Notifier<W: Write> {
    id: String,
    out: W,
}

impl<W: Write> Notifier<W> {
    pub fn new(id: impl Into<String>, out: W) -> Self {
        Self { id: id.into(), out }
    }
}

impl<W: Write> EventSink for Notifier<W> {
    fn emit(&mut self, event: &SyncEvent) {
        let line = json!({ "id": self.id, "event": event });
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            tracing::warn!(id = %self.id, event = event.kind(), "failed to write notification: {}", e);
        }
    }
}
