//! Decoder for the `data:` lines of an OpenAI-style chat-completion stream.
//!
//! Bytes arrive in arbitrary pieces, so a partial line (possibly a partial
//! UTF-8 sequence) is buffered until its newline shows up.

use tracing::debug;

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Done,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decodes whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn parse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim_start();
    if data == DONE_MARKER {
        return Some(StreamEvent::Done);
    }

    let json: serde_json::Value = match serde_json::from_str(data) {
        Ok(json) => json,
        Err(err) => {
            debug!(%err, "skipping undecodable stream line");
            return None;
        }
    };

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(|message| message.as_str())
            .map(|message| message.to_string())
            .unwrap_or_else(|| error.to_string());
        return Some(StreamEvent::Failed(message));
    }

    json.get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|content| !content.is_empty())
        .map(|content| StreamEvent::Delta(content.to_string()))
}
