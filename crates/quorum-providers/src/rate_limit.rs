//! Request-level rate limiting shared by all provider adapters.
//!
//! The limiter keeps a sliding 60-second window of request timestamps. When
//! the window is at capacity, `acquire` sleeps until the oldest timestamp
//! expires instead of rejecting the call: callers experience added latency,
//! never an error. The sleep is an ordinary tokio sleep and is cancellable.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Length of the sliding window.
const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter.
pub struct RateLimiter {
    /// Maximum requests allowed inside one window.
    max_per_window: usize,
    /// Timestamps of requests still inside the window, oldest first.
    stamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_requests_per_minute` requests.
    ///
    /// A limit of zero is treated as one to keep the limiter usable.
    #[must_use]
    pub fn new(max_requests_per_minute: usize) -> Self {
        Self {
            max_per_window: max_requests_per_minute.max(1),
            stamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Waits until a request slot is free, then claims it.
    ///
    /// Blocks (asynchronously) when the window is full; returns immediately
    /// otherwise.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self.stamps.lock().await;
                let now = Instant::now();

                while let Some(&oldest) = stamps.front() {
                    if now.duration_since(oldest) >= WINDOW {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }

                if stamps.len() < self.max_per_window {
                    stamps.push_back(now);
                    return;
                }

                // Window full: wait for the oldest stamp to expire.
                match stamps.front() {
                    Some(&oldest) => WINDOW.saturating_sub(now.duration_since(oldest)),
                    None => Duration::ZERO,
                }
            };

            sleep(wait).await;
        }
    }

    /// Number of requests currently inside the window.
    pub async fn in_flight(&self) -> usize {
        let mut stamps = self.stamps.lock().await;
        let now = Instant::now();
        while let Some(&oldest) = stamps.front() {
            if now.duration_since(oldest) >= WINDOW {
                stamps.pop_front();
            } else {
                break;
            }
        }
        stamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_below_capacity_is_immediate() {
        let limiter = RateLimiter::new(3);
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.in_flight().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_at_capacity_waits_for_oldest_to_expire() {
        let limiter = RateLimiter::new(2);
        limiter.acquire().await;
        limiter.acquire().await;

        let before = Instant::now();
        limiter.acquire().await;
        let waited = Instant::now().duration_since(before);

        // Third acquire had to wait for the full window to pass.
        assert!(waited >= Duration::from_secs(59));
        assert_eq!(limiter.in_flight().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_rather_than_resets() {
        let limiter = RateLimiter::new(2);
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(31)).await;

        // First stamp expired, so a slot is free without waiting.
        limiter.acquire().await;
        assert_eq!(limiter.in_flight().await, 2);
    }

    #[tokio::test]
    async fn zero_limit_is_clamped_to_one() {
        let limiter = RateLimiter::new(0);
        limiter.acquire().await;
        assert_eq!(limiter.in_flight().await, 1);
    }
}
