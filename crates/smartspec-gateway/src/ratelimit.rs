//! Per-user request rate limiting.
//!
//! Fixed one-minute windows, checked before the credit estimate so a
//! rate-limited caller costs nothing. The limiter is process-local state;
//! limits reset on restart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

const WINDOW: Duration = Duration::from_secs(60);

/// Fixed-window rate limiter keyed by user id.
pub struct RateLimiter {
    limit_per_minute: u32,
    windows: Mutex<HashMap<Uuid, (Instant, u32)>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request attempt for `user_id`.
    ///
    /// # Errors
    /// Returns the seconds until the window resets when the limit is hit.
    pub fn check(&self, user_id: Uuid) -> Result<(), u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let entry = windows.entry(user_id).or_insert((now, 0));

        if now.duration_since(entry.0) >= WINDOW {
            *entry = (now, 0);
        }
        if entry.1 >= self.limit_per_minute {
            let elapsed = now.duration_since(entry.0);
            let retry_after = WINDOW.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }
        entry.1 += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_under_the_limit_pass() {
        let limiter = RateLimiter::new(3);
        let user = Uuid::new_v4();
        for _ in 0..3 {
            assert!(limiter.check(user).is_ok());
        }
    }

    #[test]
    fn excess_requests_get_a_retry_after() {
        let limiter = RateLimiter::new(2);
        let user = Uuid::new_v4();
        limiter.check(user).unwrap();
        limiter.check(user).unwrap();
        let retry_after = limiter.check(user).unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 60);
    }

    #[test]
    fn users_are_limited_independently() {
        let limiter = RateLimiter::new(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        limiter.check(a).unwrap();
        assert!(limiter.check(a).is_err());
        assert!(limiter.check(b).is_ok());
    }
}
