use crate::groq::transport::{ByteStream, Transport, TransportError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::Instant;

enum Scripted {
    Fail(TransportError),
    Body(Vec<Result<Vec<u8>, TransportError>>),
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Scripted>,
    calls: Vec<Instant>,
    bodies: Vec<serde_json::Value>,
}

/// Plays back a fixed list of responses, one per `post`, and records what
/// was sent. Clones share the same script.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Rc<RefCell<Script>>,
}

impl ScriptedTransport {
    pub fn then_fail(self, err: TransportError) -> Self {
        self.script.borrow_mut().steps.push_back(Scripted::Fail(err));
        self
    }

    pub fn then_body(self, pieces: Vec<Result<Vec<u8>, TransportError>>) -> Self {
        self.script.borrow_mut().steps.push_back(Scripted::Body(pieces));
        self
    }

    pub fn then_stream(self, deltas: &[&str]) -> Self {
        let mut pieces: Vec<Result<Vec<u8>, TransportError>> =
            deltas.iter().map(|delta| Ok(sse_delta(delta))).collect();
        pieces.push(Ok(b"data: [DONE]\n\n".to_vec()));
        self.then_body(pieces)
    }

    pub fn calls(&self) -> usize {
        self.script.borrow().calls.len()
    }

    pub fn gaps(&self) -> Vec<Duration> {
        let script = self.script.borrow();
        script
            .calls
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    pub fn last_body(&self) -> serde_json::Value {
        self.script
            .borrow()
            .bodies
            .last()
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }
}

impl Transport for ScriptedTransport {
    async fn post(&self, body: &serde_json::Value) -> Result<ByteStream, TransportError> {
        let mut script = self.script.borrow_mut();
        script.calls.push(Instant::now());
        script.bodies.push(body.clone());
        match script.steps.pop_front() {
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Body(pieces)) => Ok(Box::pin(futures::stream::iter(pieces))),
            None => Err(TransportError::Other("script exhausted".to_string())),
        }
    }
}

pub fn sse_delta(content: &str) -> Vec<u8> {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": content}}]})
    )
    .into_bytes()
}

pub fn status(code: u16) -> TransportError {
    TransportError::Status {
        status: code,
        body: String::new(),
        retry_after: None,
    }
}
