use std::future::Future;
use std::time::Duration;

use crate::error::{AnalysisError, AnalysisResult};

/// Bounded retry with exponential backoff, shared by the market-data
/// client, the sentiment engine and the orchestrator. Only errors whose
/// `is_retryable()` predicate holds are retried; everything else is
/// surfaced immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// Delay before retry number `attempt` (0-based): base * multiplier^attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        self.base_delay.mul_f64(factor)
    }

    /// Run `op`, retrying retryable failures up to `max_attempts` total tries.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> AnalysisResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AnalysisResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        "Retryable failure (attempt {}/{}), backing off {:?}: {}",
                        attempt + 1,
                        self.max_attempts,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
