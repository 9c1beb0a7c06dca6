//! Bounded retry for host-level entry points

use std::thread;
use std::time::Duration;
use tracing::info;

use crate::errors::Result;

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls, including the first
    pub max_attempts: u32,
    /// Pause between consecutive calls
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds or the attempts are spent
    ///
    /// Blocks the calling thread for the delays. Returns the last error.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    info!(attempt, error = %e, "{} current try failed", label);
                    attempt += 1;
                    thread::sleep(self.delay);
                }
            }
        }
    }
}
