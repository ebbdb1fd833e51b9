use std::future::Future;
use std::time::Duration;

/// Bound and pacing of [`retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        retry(self.attempts, self.delay, operation).await
    }
}

/// Runs `operation` up to `attempts` times, sleeping `delay` between failed attempts.
///
/// Returns the first success, or the error of the last attempt. An `attempts` of zero is
/// treated as one attempt.
pub async fn retry<T, E, F, Fut>(attempts: u32, delay: Duration, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(err) => {
                log::debug!("Attempt {}/{} failed: {}", attempt, attempts, err);
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}
