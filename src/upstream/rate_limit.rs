//! Rolling-window rate limiter for outgoing upstream calls.
//!
//! At most `max_requests` calls may start within any `window`. Callers block
//! on [`RateLimiter::acquire`] until a slot frees up; requests are never
//! dropped.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
  max_requests: usize,
  window: Duration,
  starts: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
  pub fn new(max_requests: usize, window: Duration) -> Self {
    Self {
      max_requests: max_requests.max(1),
      window,
      starts: Mutex::new(VecDeque::new()),
    }
  }

  /// Wait until a request may start, then record it.
  pub async fn acquire(&self) {
    loop {
      let wait = {
        let mut starts = self.starts.lock().await;
        let now = Instant::now();

        while let Some(&oldest) = starts.front() {
          if now.duration_since(oldest) >= self.window {
            starts.pop_front();
          } else {
            break;
          }
        }

        if starts.len() < self.max_requests {
          starts.push_back(now);
          return;
        }

        // Window is full; sleep until the oldest entry ages out. The lock
        // is released before sleeping so other callers can queue up.
        let oldest = *starts.front().expect("non-empty after len check");
        (oldest + self.window).saturating_duration_since(now)
      };

      tokio::time::sleep(wait).await;
    }
  }
}
