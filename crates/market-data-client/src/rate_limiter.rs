use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Sliding-window token bucket: at most `limit` calls to `acquire` complete
/// within any trailing 60s window. Mirrors the provider-rate-limit guard
/// this client is built against, generalized off a hardcoded per-minute cap
/// into a constructor argument.
#[derive(Clone)]
pub struct RateLimiter {
    limit_per_minute: usize,
    window: Arc<Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: usize) -> Self {
        Self {
            limit_per_minute,
            window: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|oldest| now.duration_since(*oldest) > Duration::from_secs(60))
                {
                    window.pop_front();
                }

                if window.len() < self.limit_per_minute {
                    window.push_back(now);
                    None
                } else {
                    let oldest = *window.front().expect("len >= limit > 0");
                    Some(Duration::from_secs(60) - now.duration_since(oldest))
                }
            };

            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}
