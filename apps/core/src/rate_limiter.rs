use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AppError;

/// A simple rate limiter using a sliding window algorithm.
///
/// It tracks the timestamps of the requests sent within the current window
/// to determine if a new request is allowed.
pub struct RateLimiter {
    /// Timestamps of the requests inside the window, oldest first.
    requests: VecDeque<Instant>,
    /// The maximum number of requests allowed within the `window`.
    limit: usize,
    /// The duration of the sliding window.
    window: Duration,
}

impl RateLimiter {
    /// Creates a new `RateLimiter`.
    ///
    /// # Arguments
    ///
    /// * `limit` - The number of requests allowed per `window`.
    /// * `window` - The time duration of the sliding window.
    pub fn new(limit: usize, window: Duration) -> Self {
        RateLimiter {
            requests: VecDeque::new(),
            limit: limit.max(1),
            window,
        }
    }

    pub fn per_minute(limit: usize) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Checks whether a request may be sent at `now`.
    ///
    /// If the request is allowed, it's recorded and `Ok(())` is returned.
    /// Otherwise the error carries how long until the oldest request leaves
    /// the window.
    pub fn check_at(&mut self, now: Instant) -> Result<(), Duration> {
        // Remove timestamps older than the window
        while let Some(&oldest) = self.requests.front() {
            if now.duration_since(oldest) >= self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }

        if self.requests.len() < self.limit {
            self.requests.push_back(now);
            Ok(())
        } else {
            let oldest = self.requests.front().copied().unwrap_or(now);
            Err(self.window.saturating_sub(now.duration_since(oldest)))
        }
    }

    pub fn check(&mut self) -> Result<(), Duration> {
        self.check_at(Instant::now())
    }
}

/// Process-scoped limiter shared by every batch of every run.
///
/// Callers over the limit wait for a free slot instead of failing, up to
/// `max_wait`.
#[derive(Clone)]
pub struct SharedRateLimiter {
    inner: Arc<Mutex<RateLimiter>>,
    max_wait: Duration,
}

impl SharedRateLimiter {
    pub fn new(limiter: RateLimiter, max_wait: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(limiter)),
            max_wait,
        }
    }

    /// Waits for a slot.
    ///
    /// Fails with `RateLimited` when no slot frees up within `max_wait`, and
    /// with `Cancelled` as soon as `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), AppError> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            let wait = {
                let mut limiter = self.inner.lock().await;
                match limiter.check() {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };

            let now = Instant::now();
            if now + wait > deadline {
                return Err(AppError::RateLimited);
            }
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting for a slot");

            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
