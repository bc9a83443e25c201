use crate::groq::transport::TransportError;
use crate::nice_display::NiceDisplay;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    AuthError,
    RateLimited,
    ServerError(u16),
    Timeout,
    NetworkError,
    Unknown,
}

impl ErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::BadRequest,
            401 | 403 => ErrorKind::AuthError,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::ServerError(status),
            _ => ErrorKind::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorKind::RateLimited
            | ErrorKind::ServerError(_)
            | ErrorKind::Timeout
            | ErrorKind::NetworkError => true,
            ErrorKind::BadRequest | ErrorKind::AuthError | ErrorKind::Unknown => false,
        }
    }

    fn remedy(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => {
                "Check the model name, make sure max_tokens is greater than 0, and make sure the messages are role/content pairs with the system message first"
            }
            ErrorKind::AuthError => {
                "Check your GROQ_API_KEY; Groq keys start with gsk_ and can be created in the Groq console"
            }
            ErrorKind::RateLimited => "Wait a moment before asking again, or send requests less often",
            ErrorKind::ServerError(_) => "Groq is having trouble right now; try again in a minute",
            ErrorKind::Timeout => "Try again, or reduce max_tokens so the answer finishes sooner",
            ErrorKind::NetworkError => "Check your internet connection and try again",
            ErrorKind::Unknown => "Run again with RUST_LOG=debug to see the full exchange",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::BadRequest => write!(f, "BadRequest (400)"),
            ErrorKind::AuthError => write!(f, "AuthError (401)"),
            ErrorKind::RateLimited => write!(f, "RateLimited (429)"),
            ErrorKind::ServerError(status) => write!(f, "ServerError ({})", status),
            ErrorKind::Timeout => write!(f, "Timeout"),
            ErrorKind::NetworkError => write!(f, "NetworkError"),
            ErrorKind::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<&TransportError> for ErrorKind {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Status { status, .. } => ErrorKind::from_status(*status),
            TransportError::Timeout(_) => ErrorKind::Timeout,
            TransportError::Connect(_) | TransportError::Body(_) => ErrorKind::NetworkError,
            TransportError::Other(_) => ErrorKind::Unknown,
        }
    }
}

/// `attempts` counts network attempts; it is 0 when the request was
/// rejected before anything was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientError {
    pub kind: ErrorKind,
    pub attempts: u32,
    pub last_message: String,
}

impl ClientError {
    pub fn new(kind: ErrorKind, attempts: u32, last_message: impl Into<String>) -> Self {
        Self {
            kind,
            attempts,
            last_message: last_message.into(),
        }
    }
}

impl NiceDisplay for ClientError {
    fn message(&self) -> String {
        if self.attempts == 0 {
            format!(
                "I did not send the request to Groq, it was rejected as {}: {}",
                self.kind, self.last_message
            )
        } else {
            format!(
                "I had trouble talking to Groq, {} after {} attempt(s): {}",
                self.kind, self.attempts, self.last_message
            )
        }
    }

    fn hint(&self) -> Option<String> {
        Some(self.kind.remedy().to_string())
    }
}
