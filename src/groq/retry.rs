use crate::groq::error::ErrorKind;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry(Duration),
    Fail,
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// `attempt` is the number of retries already made for this request.
    pub fn decide(&self, kind: ErrorKind, attempt: u32) -> Decision {
        if !kind.is_retryable() || attempt >= self.max_retries {
            return Decision::Fail;
        }

        let factor = 2u32.saturating_pow(attempt);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        Decision::Retry(delay)
    }
}

#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<ErrorKind>,
    pub next_delay: Duration,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            last_error: None,
            next_delay: Duration::ZERO,
        }
    }

    /// Records a failure and returns how long to sleep before the next try,
    /// or `None` when the request should fail.
    ///
    /// Jitter adds up to half of the backoff step. Since the next step is
    /// twice as large, the sequence of delays never decreases; the floor at
    /// the previous delay keeps that true once the cap or a `Retry-After`
    /// hint is involved.
    pub fn advance<R: Rng>(
        &mut self,
        policy: &RetryPolicy,
        kind: ErrorKind,
        retry_after: Option<Duration>,
        rng: &mut R,
    ) -> Option<Duration> {
        self.last_error = Some(kind);

        match policy.decide(kind, self.attempt) {
            Decision::Fail => None,
            Decision::Retry(step) => {
                let mut delay = step;

                if policy.jitter && !step.is_zero() {
                    let spread = step.as_secs_f64() / 2.0;
                    delay += Duration::from_secs_f64(rng.gen_range(0.0..spread));
                }

                delay = delay.min(policy.max_delay);

                if let Some(hint) = retry_after {
                    delay = delay.max(hint.min(policy.max_delay));
                }

                delay = delay.max(self.next_delay);

                self.attempt += 1;
                self.next_delay = delay;
                Some(delay)
            }
        }
    }
}

/// Parses a `Retry-After` header given in seconds or as an HTTP date.
pub fn parse_retry_after(header: &str) -> Option<Duration> {
    let header = header.trim();

    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(seconds) = header.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds).ok();
    }

    let date = chrono::DateTime::parse_from_rfc2822(header).ok()?;
    let wait = date.signed_duration_since(chrono::Utc::now());
    wait.to_std().ok()
}
