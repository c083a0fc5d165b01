use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::GenerationError;

/// Attempt schedule for image generation calls.
///
/// Rate limits back off linearly (`rate_limit_step * attempt`, capped at
/// `rate_limit_cap`) and are retried even on the final attempt; any other
/// failure gets a short `pause`, and the final one is returned as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) max_attempts: u32,
    pub(crate) rate_limit_step: Duration,
    pub(crate) rate_limit_cap: Duration,
    pub(crate) pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_step: Duration::from_secs(30),
            rate_limit_cap: Duration::from_secs(120),
            pause: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub(crate) fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before the next attempt after `attempt` (0-based) failed, or
    /// `None` when the error should be returned to the caller.
    pub(crate) fn delay_after(&self, attempt: u32, err: &GenerationError) -> Option<Duration> {
        if err.is_rate_limit() {
            Some((self.rate_limit_step * (attempt + 1)).min(self.rate_limit_cap))
        } else if attempt + 1 >= self.max_attempts {
            None
        } else {
            Some(self.pause)
        }
    }

    /// Runs `op` until it succeeds or the schedule runs out. A raised `cancel`
    /// flag stops the loop instead of waiting for the next attempt.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        cancel: &AtomicBool,
        mut op: F,
    ) -> Result<T, GenerationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, GenerationError>>,
    {
        for attempt in 0..self.max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    error!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Image generation attempt failed"
                    );
                    match self.delay_after(attempt, &e) {
                        Some(_) if cancel.load(Ordering::Relaxed) => {
                            warn!("Cancelled, not retrying");
                            return Err(GenerationError::Cancelled);
                        }
                        Some(delay) => {
                            if e.is_rate_limit() {
                                info!(wait_secs = delay.as_secs(), "Rate limit hit, waiting");
                            }
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
            }
        }
        Err(GenerationError::RetriesExhausted {
            attempts: self.max_attempts,
        })
    }
}
