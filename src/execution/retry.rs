use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed delay between attempts
///
/// Only failures the caller classifies as transient are retried. The final
/// error is logged with the operation context and handed back as a value,
/// so a single failed exchange call never unwinds past its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
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

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out
    ///
    /// # Arguments
    /// * `context` - Shown in logs, e.g. "sell ETH"
    /// * `is_transient` - Decides whether a failure is worth another attempt
    /// * `op` - Produces a fresh future for every attempt
    pub async fn run<T, E, F, Fut, P>(
        &self,
        context: &str,
        is_transient: P,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("✓ {} succeeded after {} attempts", context, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if is_transient(&e) && attempt < max_attempts => {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        context,
                        attempt,
                        max_attempts,
                        e,
                        self.delay
                    );
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => {
                    if is_transient(&e) {
                        tracing::error!(
                            "✗ {} gave up after {} attempts: {}",
                            context,
                            attempt,
                            e
                        );
                    } else {
                        tracing::error!("✗ {} failed: {}", context, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
