use serde::Serialize;
use std::io::Write;

/// Progress stream of one sync session.
///
/// For each table a `Progress` is followed by exactly one `Complete` or
/// `Error`; `Done` closes the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SyncEvent {
    Progress {
        schema: String,
        table: String,
    },
    Complete {
        schema: String,
        table: String,
        record_count: usize,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        table: Option<String>,
    },
    Done {
        tables_synced: usize,
        total_records: usize,
        timestamp: String,
    },
}

impl SyncEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::Progress { .. } => "progress",
            SyncEvent::Complete { .. } => "complete",
            SyncEvent::Error { .. } => "error",
            SyncEvent::Done { .. } => "done",
        }
    }
}

pub trait EventSink {
    fn emit(&mut self, event: &SyncEvent);
}

impl EventSink for Vec<SyncEvent> {
    fn emit(&mut self, event: &SyncEvent) {
        self.push(event.clone());
    }
}

/// Writes each event as one Server-Sent-Events frame: `data: {json}\n\n`.
pub struct SseWriter<W: Write> {
    out: W,
}

impl<W: Write> SseWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn sse_frame(event: &SyncEvent) -> String {
    let body = serde_json::to_string(event).unwrap_or_else(|_| "{\"type\":\"error\"}".to_string());
    format!("data: {}\n\n", body)
}

impl<W: Write> EventSink for SseWriter<W> {
    fn emit(&mut self, event: &SyncEvent) {
        let frame = sse_frame(event);
        if let Err(e) = self
            .out
            .write_all(frame.as_bytes())
            .and_then(|_| self.out.flush())
        {
            tracing::warn!(event = event.kind(), "failed to write sync event: {}", e);
        }
    }
}
