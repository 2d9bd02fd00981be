use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::warn;

use crate::config::ThrottleConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug)]
struct Attempt {
    window_start: Instant,
    failures: u32,
    locked_until: Option<Instant>,
}

/// Per-key failure counting with a lockout once `max_attempts` is reached
/// inside one window. Keys are account emails.
pub struct LoginThrottle {
    cfg: ThrottleConfig,
    attempts: Mutex<HashMap<String, Attempt>>,
}

impl LoginThrottle {
    pub fn new(cfg: ThrottleConfig) -> Self {
        Self { cfg, attempts: Mutex::new(HashMap::new()) }
    }

    /// Fails with `TooManyRequests` while `key` is locked out.
    pub fn check(&self, key: &str) -> AppResult<()> {
        if self.cfg.max_attempts == 0 {
            return Ok(());
        }
        let mut attempts = self.attempts.lock();
        let now = Instant::now();
        let Some(entry) = attempts.get_mut(key) else { return Ok(()) };
        if let Some(locked_until) = entry.locked_until {
            if now < locked_until {
                let secs = locked_until.saturating_duration_since(now).as_secs().max(1);
                return Err(AppError::too_many_requests(secs));
            }
            attempts.remove(key);
            return Ok(());
        }
        if now.duration_since(entry.window_start) > self.cfg.window {
            attempts.remove(key);
        }
        Ok(())
    }

    pub fn record_failure(&self, key: &str) {
        if self.cfg.max_attempts == 0 {
            return;
        }
        let mut attempts = self.attempts.lock();
        let now = Instant::now();
        let entry = attempts.entry(key.to_string()).or_insert(Attempt {
            window_start: now,
            failures: 0,
            locked_until: None,
        });
        if now.duration_since(entry.window_start) > self.cfg.window {
            entry.window_start = now;
            entry.failures = 0;
            entry.locked_until = None;
        }
        entry.failures = entry.failures.saturating_add(1);
        if entry.failures >= self.cfg.max_attempts {
            entry.locked_until = Some(now + self.cfg.lockout);
            warn!(target: "auth", account = key, failures = entry.failures, "account temporarily locked");
        }
    }

    pub fn clear(&self, key: &str) {
        self.attempts.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg(max: u32, window_ms: u64, lockout_ms: u64) -> ThrottleConfig {
        ThrottleConfig {
            max_attempts: max,
            window: Duration::from_millis(window_ms),
            lockout: Duration::from_millis(lockout_ms),
        }
    }

    #[test]
    fn locks_after_max_failures() {
        let t = LoginThrottle::new(cfg(3, 60_000, 60_000));
        for _ in 0..2 {
            t.record_failure("a@x");
            assert!(t.check("a@x").is_ok());
        }
        t.record_failure("a@x");
        let err = t.check("a@x").unwrap_err();
        assert_eq!(err.http_status(), 429);
        // other keys unaffected
        assert!(t.check("b@x").is_ok());
    }

    #[test]
    fn clear_resets() {
        let t = LoginThrottle::new(cfg(1, 60_000, 60_000));
        t.record_failure("a@x");
        assert!(t.check("a@x").is_err());
        t.clear("a@x");
        assert!(t.check("a@x").is_ok());
    }

    #[test]
    fn lockout_expires() {
        let t = LoginThrottle::new(cfg(1, 60_000, 20));
        t.record_failure("a@x");
        assert!(t.check("a@x").is_err());
        std::thread::sleep(Duration::from_millis(40));
        assert!(t.check("a@x").is_ok());
    }

    #[test]
    fn zero_disables() {
        let t = LoginThrottle::new(cfg(0, 60_000, 60_000));
        for _ in 0..10 {
            t.record_failure("a@x");
        }
        assert!(t.check("a@x").is_ok());
    }
}
