use std::future::Future;
use std::time::Duration;

use crate::{Result, VectorStoreError};

/// Exponential backoff used for connection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay * 2u32.saturating_pow(attempt);
        delay.min(self.max_delay)
    }

    /// Run `op` until it succeeds, a non-retryable error occurs, or
    /// `max_retries` retries are used up.
    ///
    /// Exhaustion surfaces as [`VectorStoreError::Connection`] carrying the
    /// last failure as its source.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.max_retries => {
                    return Err(VectorStoreError::connection(
                        format!("{what} failed after {} attempt(s)", attempt + 1),
                        Some(Box::new(e)),
                    ));
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        "{what} attempt {} failed: {e}; retrying in {delay:?}",
                        attempt + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
