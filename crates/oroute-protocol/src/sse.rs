use bytes::Bytes;
use serde::Serialize;

/// One Server-Sent Event. `data` joins multi-line data fields with `\n`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub name: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

/// Incremental SSE decoder. Feed it byte chunks as they arrive; complete
/// events are returned as soon as their terminating blank line is seen.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    name: Option<String>,
    id: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.push_str(&String::from_utf8_lossy(chunk))
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);
            if line.ends_with('\r') {
                line.pop();
            }

            if line.is_empty() {
                self.flush_event(&mut events);
            } else {
                self.accept_line(&line);
            }
        }

        events
    }

    /// Drain whatever the stream ended with, terminated or not.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                self.accept_line(line);
            }
        }
        self.flush_event(&mut events);
        events
    }

    fn accept_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                self.name = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "data" => self.data_lines.push(value.to_string()),
            "id" => {
                self.id = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            _ => {}
        }
    }

    fn flush_event(&mut self, events: &mut Vec<SseEvent>) {
        if self.name.is_none() && self.id.is_none() && self.data_lines.is_empty() {
            return;
        }
        events.push(SseEvent {
            name: self.name.take(),
            id: self.id.take(),
            data: self.data_lines.join("\n"),
        });
        self.data_lines.clear();
    }
}

/// Encode a value as a `data: <json>\n\n` frame. Returns `None` only when
/// the value itself refuses to serialize.
pub fn data_frame<T: Serialize>(value: &T) -> Option<Bytes> {
    let payload = serde_json::to_vec(value).ok()?;
    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(b"\n\n");
    Some(Bytes::from(frame))
}
