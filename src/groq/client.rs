use crate::config::Config;
use crate::groq::cache::ResponseCache;
use crate::groq::completion::{Completion, Response};
use crate::groq::error::{ClientError, ErrorKind};
use crate::groq::message::ChatMessage;
use crate::groq::rate_limiter::RateLimiter;
use crate::groq::request_config::RequestConfig;
use crate::groq::retry::{RetryPolicy, RetryState};
use crate::groq::sse::{SseDecoder, StreamEvent};
use crate::groq::transport::{ByteStream, HttpTransport, Transport, TransportError};
use crate::nice_display::NiceDisplay;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Finite and not restartable. Dropping it releases the connection.
pub type ChunkStream<'a> = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + 'a>>;

pub enum Reply<'a> {
    Stream(ChunkStream<'a>),
    Text(String),
}

impl<'a> Reply<'a> {
    /// Waits for the whole answer, forwarding each piece to `on_chunk`.
    pub async fn for_each_chunk<F>(self, mut on_chunk: F) -> Result<String, ClientError>
    where
        F: FnMut(&str),
    {
        match self {
            Reply::Text(text) => {
                on_chunk(&text);
                Ok(text)
            }
            Reply::Stream(mut chunks) => {
                let mut answer = String::new();
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk?;
                    on_chunk(&chunk);
                    answer.push_str(&chunk);
                }
                Ok(answer)
            }
        }
    }
}

pub struct ResilientClient<T: Transport> {
    transport: T,
    limiter: RateLimiter,
    policy: RetryPolicy,
    cache: ResponseCache,
    rng: Mutex<SmallRng>,
}

impl ResilientClient<HttpTransport> {
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config.base_url, config.groq_key.clone(), REQUEST_TIMEOUT)
            .map_err(|err| ClientError::new(ErrorKind::Unknown, 0, err.describe()))?;

        if !config.groq_key.looks_like_groq_key() {
            warn!("GROQ_API_KEY does not start with gsk_, requests will likely be rejected");
        }

        Ok(Self::new(
            transport,
            RateLimiter::min_interval(config.min_interval),
            RetryPolicy::default().with_max_retries(config.max_retries),
        ))
    }
}

impl<T: Transport> ResilientClient<T> {
    pub fn new(transport: T, limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self {
            transport,
            limiter,
            policy,
            cache: ResponseCache::default(),
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    /// Validation happens before anything is sent, so a malformed request
    /// fails here with `BadRequest` and zero attempts.
    pub async fn send(
        &self,
        messages: Vec<ChatMessage>,
        config: RequestConfig,
    ) -> Result<Reply<'_>, ClientError> {
        let completion = Completion::new(messages, config)
            .map_err(|err| ClientError::new(ErrorKind::BadRequest, 0, err.message()))?;

        if completion.config().stream {
            Ok(Reply::Stream(self.stream_chunks(completion)))
        } else {
            self.complete(completion).await.map(Reply::Text)
        }
    }

    async fn dispatch(&self, body: &serde_json::Value) -> Result<ByteStream, TransportError> {
        let waited = self.limiter.until_ready().await;
        if !waited.is_zero() {
            debug!(waited_ms = waited.as_millis() as u64, "rate limited locally");
        }
        self.transport.post(body).await
    }

    /// Sleeps before the next attempt, or turns `failure` into the error
    /// the caller sees.
    async fn back_off(&self, state: &mut RetryState, failure: &TransportError) -> Result<(), ClientError> {
        let kind = ErrorKind::from(failure);
        let attempts = state.attempt + 1;
        let description = failure.describe();

        let delay = {
            let mut rng = self.rng.lock();
            state.advance(&self.policy, kind, failure.retry_after(), &mut *rng)
        };

        match delay {
            Some(delay) => {
                warn!(
                    kind = %kind,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = %description,
                    "retrying groq request"
                );
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Err(ClientError::new(kind, attempts, description)),
        }
    }

    fn stream_chunks(&self, completion: Completion) -> ChunkStream<'_> {
        Box::pin(async_stream::try_stream! {
            let body = completion.to_json(true);
            let mut state = RetryState::new();

            'attempts: loop {
                let failure = match self.dispatch(&body).await {
                    Err(err) => err,
                    Ok(mut bytes) => {
                        let mut decoder = SseDecoder::new();
                        let mut delivered = false;

                        let failure = loop {
                            let events = match bytes.next().await {
                                Some(Ok(chunk)) => decoder.feed(&chunk),
                                Some(Err(err)) => break err,
                                None => {
                                    let events = decoder.finish();
                                    if !events.contains(&StreamEvent::Done) {
                                        break TransportError::Body(
                                            "stream ended before the completion marker".to_string(),
                                        );
                                    }
                                    events
                                }
                            };

                            for event in events {
                                match event {
                                    StreamEvent::Delta(text) => {
                                        delivered = true;
                                        yield text;
                                    }
                                    StreamEvent::Done => break 'attempts,
                                    StreamEvent::Failed(message) => {
                                        Err::<(), ClientError>(ClientError::new(
                                            ErrorKind::Unknown,
                                            state.attempt + 1,
                                            message,
                                        ))?;
                                    }
                                }
                            }
                        };

                        if delivered {
                            warn!(reason = %failure.describe(), "stream interrupted after partial output");
                            Err::<(), ClientError>(ClientError::new(
                                ErrorKind::from(&failure),
                                state.attempt + 1,
                                format!(
                                    "the answer was cut off part way through ({})",
                                    failure.describe()
                                ),
                            ))?;
                        }

                        failure
                    }
                };

                self.back_off(&mut state, &failure).await?;
            }
        })
    }

    async fn complete(&self, completion: Completion) -> Result<String, ClientError> {
        let key = completion.cache_key();
        if let Some(answer) = self.cache.get(&key) {
            debug!("answering from response cache");
            return Ok(answer);
        }

        let body = completion.to_json(false);
        let mut state = RetryState::new();

        loop {
            let failure = match self.dispatch(&body).await {
                Err(err) => err,
                Ok(bytes) => match read_to_end(bytes).await {
                    Err(err) => err,
                    Ok(raw) => {
                        let attempts = state.attempt + 1;
                        let json: serde_json::Value = serde_json::from_slice(&raw).map_err(|err| {
                            ClientError::new(
                                ErrorKind::Unknown,
                                attempts,
                                format!("could not decode the response: {}", err),
                            )
                        })?;
                        let answer = Response::new(json).as_message().map_err(|err| {
                            ClientError::new(ErrorKind::Unknown, attempts, err.message())
                        })?;

                        self.cache.put(key, answer.clone());
                        return Ok(answer);
                    }
                },
            };

            self.back_off(&mut state, &failure).await?;
        }
    }
}

async fn read_to_end(mut bytes: ByteStream) -> Result<Vec<u8>, TransportError> {
    let mut raw = Vec::new();
    while let Some(chunk) = bytes.next().await {
        raw.extend_from_slice(&chunk?);
    }
    Ok(raw)
}
