use std::future::Future;
use std::time::Duration;

use crate::client::error::ClientError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            jitter_max: Some(Duration::from_millis(250)),
        }
    }
}

impl RetryConfig {
    /// Wait before the retry that follows the `failures`-th consecutive failure.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let backoff = self.base_backoff.saturating_mul(1 << exponent).min(self.max_backoff);

        match self.jitter_max {
            Some(jitter_max) => {
                let jitter_ms = u64::try_from(jitter_max.as_millis()).unwrap_or(u64::MAX);
                let extra = if jitter_ms == 0 { 0 } else { rand::random::<u64>() % (jitter_ms + 1) };
                backoff + Duration::from_millis(extra)
            }
            None => backoff,
        }
    }
}

/// Runs `f` until it succeeds, fails with a final error, or attempts run out.
pub async fn retry_request<F, Fut, T>(
    config: &RetryConfig,
    operation: &'static str,
    mut f: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut failures: u32 = 0;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                failures = failures.saturating_add(1);
                let attempts = usize::try_from(failures).unwrap_or(usize::MAX);
                if !err.is_retryable() || attempts >= config.max_attempts {
                    return Err(err);
                }

                let wait = config.delay_for(failures);
                tracing::warn!(
                    operation,
                    failures,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Request failed; retrying"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}
