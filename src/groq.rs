pub mod cache;
pub mod client;
pub mod completion;
pub mod error;
pub mod message;
pub mod model;
pub mod rate_limiter;
pub mod request_config;
pub mod retry;
pub mod role;
pub mod sse;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use client::ResilientClient;
pub use error::ClientError;
pub use model::Model;
pub use request_config::RequestConfig;
