//! Per-user fixed-window token bucket at ingress (§5 backpressure): 20
//! messages / 60 seconds by default, configurable. Over-limit users get a
//! cooldown notice and the orchestrator is never invoked for that turn.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    started_at: Instant,
    count: u32,
}

pub struct RateLimiter {
    windows: Mutex<HashMap<i64, Window>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self { windows: Mutex::new(HashMap::new()), limit, window: Duration::from_secs(window_secs) }
    }

    /// Returns `true` if the message should be admitted, `false` if the
    /// user is over their budget for the current window.
    pub fn check(&self, user_id: i64) -> bool {
        let mut windows = self.windows.lock().unwrap();
        let now = Instant::now();
        let entry = windows.entry(user_id).or_insert_with(|| Window { started_at: now, count: 0 });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            false
        } else {
            entry.count += 1;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(2, 60);
        assert!(limiter.check(1));
        assert!(limiter.check(1));
        assert!(!limiter.check(1));
    }

    #[test]
    fn tracks_users_independently() {
        let limiter = RateLimiter::new(1, 60);
        assert!(limiter.check(1));
        assert!(limiter.check(2));
        assert!(!limiter.check(1));
    }
}
