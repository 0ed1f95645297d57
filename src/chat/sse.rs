//! Incremental `text/event-stream` parsing.
//!
//! Network chunks may split a line anywhere, including inside a multi-byte
//! character, so bytes are buffered until a full line is available. Every
//! `data:` line is its own record, whether or not a blank line follows it.
//! Payload interpretation is left to the caller.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    event: Option<String>,
    id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns every record it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a final line left unterminated when the stream ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buf.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&line).trim_end_matches('\r').to_owned();
        self.line(&line)
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        // a blank line ends the record that `event` and `id` belong to
        if line.is_empty() {
            self.event = None;
            self.id = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                return Some(SseEvent {
                    event: self.event.clone(),
                    id: self.id.clone(),
                    data: value.to_owned(),
                });
            }
            "event" => self.event = Some(value.to_owned()),
            "id" => self.id = Some(value.to_owned()),
            // retry and unknown fields
            _ => {}
        }
        None
    }
}
