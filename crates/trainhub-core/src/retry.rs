use std::future::Future;
use std::time::Duration;

/// Bounded retry whose delay grows linearly: 0, step, 2*step, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    pub attempts: u32,
    pub step: Duration,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            attempts: 10,
            step: Duration::from_millis(100),
        }
    }
}

impl LinearBackoff {
    pub fn new(attempts: u32, step: Duration) -> Self {
        Self { attempts, step }
    }

    /// Delay before the given 1-based attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.step * attempt.saturating_sub(1)
    }

    /// Runs `op` until it succeeds or all attempts are used; returns the last error.
    ///
    /// `op` receives the 1-based attempt number. At least one attempt is always made.
    pub async fn retry<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= attempts => return Err(e),
                Err(_) => {
                    attempt += 1;
                    tokio::time::sleep(self.delay_before(attempt)).await;
                }
            }
        }
    }
}
