//! Rate limiter for the odds provider.
//!
//! The Odds API enforces a per-minute request quota (10/min on the plan we
//! target). The limiter keeps the timestamps of admitted requests for the
//! trailing window and parks callers until the oldest one ages out.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter shared by every caller of one upstream.
///
/// Callers queue on a fair mutex, so bursts are admitted in arrival order.
/// The admitting timestamp is only recorded once the wait has finished,
/// which keeps the window intact when a waiting caller is cancelled.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Arc<Mutex<VecDeque<Instant>>>,
    quota: usize,
    period: Duration,
}

impl RateLimiter {
    /// Create with the provider's default quota (10 requests/minute).
    pub fn new() -> Self {
        Self::per_minute(10)
    }

    /// Create with a custom per-minute quota.
    pub fn per_minute(requests: u32) -> Self {
        Self::with_window(requests, WINDOW)
    }

    /// Create with a custom quota over an arbitrary window.
    pub fn with_window(requests: u32, period: Duration) -> Self {
        let quota = requests.max(1) as usize;
        Self {
            window: Arc::new(Mutex::new(VecDeque::with_capacity(quota))),
            quota,
            period,
        }
    }

    /// Wait until a request slot is available, then claim it.
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;
        loop {
            let now = Instant::now();
            prune(&mut window, now, self.period);

            if window.len() < self.quota {
                window.push_back(now);
                debug!("Rate window: {}/{} slots used", window.len(), self.quota);
                return;
            }

            let Some(&oldest) = window.front() else {
                continue;
            };
            let wait = self.period.saturating_sub(now.duration_since(oldest));
            warn!(
                "Odds quota reached ({} requests in {:?}), waiting {}ms",
                window.len(),
                self.period,
                wait.as_millis()
            );
            sleep(wait).await;
        }
    }

    /// Try to claim a slot without waiting. Returns true if acquired.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut window) = self.window.try_lock() else {
            return false;
        };
        let now = Instant::now();
        prune(&mut window, now, self.period);
        if window.len() < self.quota {
            window.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of admitted requests still inside the window.
    pub async fn in_window(&self) -> usize {
        let mut window = self.window.lock().await;
        prune(&mut window, Instant::now(), self.period);
        window.len()
    }

    pub fn quota(&self) -> usize {
        self.quota
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop timestamps that are a full period old or older.
fn prune(window: &mut VecDeque<Instant>, now: Instant, period: Duration) {
    while let Some(&front) = window.front() {
        if now.duration_since(front) >= period {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_request_waits_for_window() {
        let limiter = RateLimiter::per_minute(10);
        let start = Instant::now();

        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO, "first 10 should not wait");
        assert_eq!(limiter.in_window().await, 10);

        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(60), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(61), "waited {:?}", waited);
        assert!(limiter.in_window().await <= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_never_exceeds_quota() {
        let limiter = RateLimiter::per_minute(3);
        for _ in 0..10 {
            limiter.acquire().await;
            assert!(limiter.in_window().await <= 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_measured_from_oldest_request() {
        let limiter = RateLimiter::per_minute(2);
        let start = Instant::now();

        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(20)).await;
        limiter.acquire().await;

        // Oldest request is 20s old → 40s until it leaves the window.
        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(60), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(61), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_leaves_window_untouched() {
        let limiter = RateLimiter::per_minute(2);
        limiter.acquire().await;
        limiter.acquire().await;

        let cancelled =
            tokio::time::timeout(Duration::from_secs(5), limiter.acquire()).await;
        assert!(cancelled.is_err(), "acquire should still be waiting");
        assert_eq!(limiter.in_window().await, 2);

        // Slots free up on schedule even after the cancellation.
        tokio::time::advance(Duration::from_secs(56)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_respects_quota() {
        let limiter = RateLimiter::per_minute(1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
