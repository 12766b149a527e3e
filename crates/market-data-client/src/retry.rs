use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff with jitter: 3 tries, base 250ms, factor 2,
/// jitter +/-25%. Retries on any error the callback classifies as
/// transient (HTTP 5xx, timeout); the callback returns the error it wants
/// surfaced after the final attempt.
pub struct BackoffPolicy {
    pub tries: u32,
    pub base: Duration,
    pub factor: f64,
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            tries: 3,
            base: Duration::from_millis(250),
            factor: 2.0,
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        let jitter_span = scaled * self.jitter;
        let offset = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
        Duration::from_secs_f64((scaled + offset).max(0.0))
    }

    pub async fn retry<T, E, F, Fut>(&self, is_retryable: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_err = None;
        for attempt in 0..self.tries {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let retryable = is_retryable(&e);
                    last_err = Some(e);
                    if !retryable || attempt + 1 == self.tries {
                        break;
                    }
                    tokio::time::sleep(self.delay_for(attempt)).await;
                }
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }
}
