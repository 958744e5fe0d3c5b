//! Retry with exponential backoff for transient failures.
//!
//! The classifier core stays a single call-and-parse; orchestrating
//! layers opt into retries around it. Only rate limits and transport
//! failures are retried; schema and auth failures will not get better
//! by asking again.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{ClassifyError, LlmError};

/// Retry policy: attempt cap plus backoff shape.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after the given 1-based attempt, doubled per
    /// attempt with +-50% jitter so concurrent pipelines do not stampede.
    fn delay_after(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        exp.mul_f64(jitter)
    }
}

/// Errors that may succeed on a second try.
pub trait RetryableError: std::fmt::Display {
    fn is_transient(&self) -> bool;

    /// Server-suggested wait, when the failure carried one.
    fn retry_hint(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for LlmError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::RequestFailed { .. }
        )
    }

    fn retry_hint(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl RetryableError for ClassifyError {
    fn is_transient(&self) -> bool {
        match self {
            ClassifyError::Llm(inner) => inner.is_transient(),
            _ => false,
        }
    }

    fn retry_hint(&self) -> Option<Duration> {
        match self {
            ClassifyError::Llm(inner) => inner.retry_hint(),
            _ => None,
        }
    }
}

/// Run `op`, retrying transient failures until the policy's attempt cap.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    E: RetryableError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && e.is_transient() => {
                let delay = e.retry_hint().unwrap_or_else(|| policy.delay_after(attempt));
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
