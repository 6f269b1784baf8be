//! Bounded retry with exponential backoff for idempotent reads.
//!
//! Only `GET` requests go through here. Metadata deletes and puts are sent
//! exactly once so an item is never written twice by the same run.

use crate::config::NetworkConfig;
use crate::session::{ApiResponse, Query, Session};
use crate::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further one.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `0.5..1.5`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: NetworkConfig::MAX_RETRIES,
            base_delay: NetworkConfig::RETRY_BASE_DELAY,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt, no retries.
    pub fn disabled() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after the failed attempt number `attempt` (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_secs = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            let factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempts are used up. Returns the last result and the attempt count.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (std::result::Result<T, E>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Request succeeded after {} attempts", attempt + 1);
                }
                return (Ok(value), attempt + 1);
            }
            Err(e) if !should_retry(&e) || attempt + 1 >= config.max_attempts => {
                if attempt > 0 {
                    warn!("Giving up after {} attempts: {}", attempt + 1, e);
                }
                return (Err(e), attempt + 1);
            }
            Err(e) => {
                let delay = config.calculate_delay(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt + 1,
                    config.max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// `GET` a path, retrying transport failures and retryable statuses.
///
/// A final non-2xx status becomes [`crate::DsapsError::Http`].
pub async fn get_with_retry<S>(
    session: &S,
    path: &str,
    query: &Query,
    config: &RetryConfig,
) -> Result<ApiResponse>
where
    S: Session + ?Sized,
{
    let (result, _attempts) = retry_async(
        config,
        || async move {
            let response: ApiResponse = session.get(path, query).await?;
            response.error_for_status()
        },
        |e: &crate::DsapsError| e.is_retryable(),
    )
    .await;
    result
}
