use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    Wait(Duration),
}

/// Sliding window over the timestamps of past grants.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        let max_calls = (max_calls as usize).max(1);
        Self {
            max_calls,
            window,
            grants: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn min_interval(interval: Duration) -> Self {
        Self::new(1, interval)
    }

    pub fn acquire(&self) -> Acquire {
        self.acquire_at(Instant::now())
    }

    /// Check and record happen under one lock. A `Wait` records nothing.
    pub fn acquire_at(&self, now: Instant) -> Acquire {
        let mut grants = self.grants.lock();

        while let Some(oldest) = grants.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                grants.pop_front();
            } else {
                break;
            }
        }

        if grants.len() < self.max_calls {
            grants.push_back(now);
            return Acquire::Granted;
        }

        match grants.front() {
            Some(oldest) => Acquire::Wait((*oldest + self.window).saturating_duration_since(now)),
            None => Acquire::Granted,
        }
    }

    /// Sleeps until a grant is available and returns the total time waited.
    pub async fn until_ready(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            match self.acquire() {
                Acquire::Granted => return waited,
                Acquire::Wait(delay) => {
                    debug!(delay_ms = delay.as_millis() as u64, "rate limiter waiting");
                    tokio::time::sleep(delay).await;
                    waited += delay;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn second_call_in_window_waits_then_is_granted() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));

        assert_eq!(limiter.acquire(), Acquire::Granted);

        let wait = match limiter.acquire() {
            Acquire::Wait(wait) => wait,
            Acquire::Granted => panic!("second call inside the window was granted"),
        };
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(1));

        tokio::time::sleep(wait).await;
        assert_eq!(limiter.acquire(), Acquire::Granted);
    }

    #[test]
    fn window_admits_max_calls_before_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));
        let start = Instant::now();

        assert_eq!(limiter.acquire_at(start), Acquire::Granted);
        assert_eq!(limiter.acquire_at(start + Duration::from_secs(1)), Acquire::Granted);
        assert_eq!(limiter.acquire_at(start + Duration::from_secs(2)), Acquire::Granted);
        assert_eq!(
            limiter.acquire_at(start + Duration::from_secs(3)),
            Acquire::Wait(Duration::from_secs(7))
        );
        assert_eq!(limiter.acquire_at(start + Duration::from_secs(10)), Acquire::Granted);
    }

    #[test]
    fn waiting_does_not_consume_a_slot() {
        let limiter = RateLimiter::min_interval(Duration::from_millis(200));
        let start = Instant::now();

        assert_eq!(limiter.acquire_at(start), Acquire::Granted);
        for _ in 0..5 {
            assert!(matches!(
                limiter.acquire_at(start + Duration::from_millis(50)),
                Acquire::Wait(_)
            ));
        }
        assert_eq!(
            limiter.acquire_at(start + Duration::from_millis(200)),
            Acquire::Granted
        );
    }

    #[test]
    fn zero_interval_never_waits() {
        let limiter = RateLimiter::min_interval(Duration::ZERO);
        for _ in 0..10 {
            assert_eq!(limiter.acquire(), Acquire::Granted);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn until_ready_reports_time_waited() {
        let limiter = RateLimiter::min_interval(Duration::from_millis(300));
        assert_eq!(limiter.until_ready().await, Duration::ZERO);
        let waited = limiter.until_ready().await;
        assert_eq!(waited, Duration::from_millis(300));
    }
}
