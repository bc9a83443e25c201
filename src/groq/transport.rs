use crate::groq::retry::parse_retry_after;
use crate::groq_key::GroqKey;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },
    Timeout(String),
    Connect(String),
    /// The connection failed after the response had started.
    Body(String),
    Other(String),
}

impl TransportError {
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Short description for logs and error messages. Pulls
    /// `error.message` out of an API error body when there is one.
    pub fn describe(&self) -> String {
        match self {
            TransportError::Status { status, body, .. } => {
                let api_message = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|json| {
                        json.get("error")
                            .and_then(|error| error.get("message"))
                            .and_then(|message| message.as_str())
                            .map(|message| message.to_string())
                    });

                match api_message {
                    Some(message) => format!("HTTP {}: {}", status, message),
                    None if body.trim().is_empty() => format!("HTTP {}", status),
                    None => format!("HTTP {}: {}", status, body.trim()),
                }
            }
            TransportError::Timeout(reason) => format!("timed out: {}", reason),
            TransportError::Connect(reason) => format!("could not connect: {}", reason),
            TransportError::Body(reason) => format!("connection dropped: {}", reason),
            TransportError::Other(reason) => reason.clone(),
        }
    }
}

/// Sends one chat-completion body and hands back the raw response bytes.
/// Non-2xx responses come back as `TransportError::Status`.
pub trait Transport {
    async fn post(&self, body: &serde_json::Value) -> Result<ByteStream, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    key: GroqKey,
    read_timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, key: GroqKey, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|err| TransportError::Other(err.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            key,
            read_timeout: timeout,
        })
    }
}

impl Transport for HttpTransport {
    async fn post(&self, body: &serde_json::Value) -> Result<ByteStream, TransportError> {
        debug!(url = %self.url, "posting chat completion");

        let request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Authorization", self.key.to_header())
            .json(body)
            .send();

        let response = tokio::time::timeout(self.read_timeout, request)
            .await
            .map_err(|_| {
                TransportError::Timeout(format!(
                    "no response within {}s",
                    self.read_timeout.as_secs()
                ))
            })?
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            let body = read_error_body(response, self.read_timeout).await;

            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }

        let read_timeout = self.read_timeout;
        let stream = async_stream::stream! {
            let mut bytes = Box::pin(response.bytes_stream());
            loop {
                match tokio::time::timeout(read_timeout, bytes.next()).await {
                    Err(_) => {
                        yield Err(TransportError::Timeout(format!(
                            "no data for {}s",
                            read_timeout.as_secs()
                        )));
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Ok(chunk))) => yield Ok(chunk.to_vec()),
                    Ok(Some(Err(err))) => {
                        yield Err(body_error(err));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Best effort: an unreadable or stalled error body becomes empty.
async fn read_error_body(response: reqwest::Response, read_timeout: Duration) -> String {
    bounded(read_timeout, response.text())
        .await
        .and_then(|text| text.ok())
        .unwrap_or_default()
}

async fn bounded<F: std::future::Future>(limit: Duration, future: F) -> Option<F::Output> {
    match tokio::time::timeout(limit, future).await {
        Ok(output) => Some(output),
        Err(_) => {
            debug!(limit_s = limit.as_secs(), "gave up reading the error body");
            None
        }
    }
}

fn request_error(err: reqwest::Error) -> TransportError {
    let timed_out = err.is_timeout();
    let builder = err.is_builder();
    let reason = err.without_url().to_string();
    if timed_out {
        TransportError::Timeout(reason)
    } else if builder {
        TransportError::Other(reason)
    } else {
        TransportError::Connect(reason)
    }
}

fn body_error(err: reqwest::Error) -> TransportError {
    let timed_out = err.is_timeout();
    let reason = err.without_url().to_string();
    if timed_out {
        TransportError::Timeout(reason)
    } else {
        TransportError::Body(reason)
    }
}
