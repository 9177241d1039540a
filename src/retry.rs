use std::thread;
use std::time::Duration;
use tracing::warn;

/// Bounded retry with doubling backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never less than one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Policy for reaching the service during sign-in
    pub const AUTHENTICATION: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(500),
    };

    /// A single attempt, no retry
    pub const NONE: RetryPolicy = RetryPolicy {
        max_attempts: 1,
        initial_backoff: Duration::ZERO,
    };

    /// One attempt plus `retries` more
    pub fn with_retries(retries: u32, initial_backoff: Duration) -> Self {
        RetryPolicy {
            max_attempts: retries.saturating_add(1),
            initial_backoff,
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        // attempt is 1-based; the wait after attempt n is initial * 2^(n-1)
        self.initial_backoff
            .saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16))
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or
    /// attempts run out. Yields the final result and the attempts used.
    pub fn run<T, E, F, R>(&self, what: &str, mut op: F, retryable: R) -> (Result<T, E>, u32)
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt < max_attempts && retryable(&e) => {
                    let wait = self.backoff_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what, attempt, max_attempts, e, wait
                    );
                    thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::NONE
    }
}
