//! Retry loop with exponential backoff and per-worker request pacing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;

use super::{ErrorClass, FetchError};

/// Retry policy for remote calls.
///
/// Transient errors are retried up to `max_attempts` total attempts with
/// exponential backoff. Rate-limit errors wait at least `rate_limit_wait`
/// and do not consume attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No waiting at all; used by tests and offline sources.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            rate_limit_wait: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based), with up to 25% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay);
        let jitter_cap = delay.as_millis() as u64 / 4;
        if jitter_cap == 0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
        delay + Duration::from_millis(jitter)
    }

    fn rate_limit_delay(&self, retry_after_secs: u64) -> Duration {
        self.rate_limit_wait.max(Duration::from_secs(retry_after_secs))
    }

    /// Run `op` until it succeeds, fails permanently, exhausts its attempts,
    /// or `cancel` is raised.
    pub fn run<T, F>(&self, what: &str, cancel: Option<&AtomicBool>, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Result<T, FetchError>,
    {
        let mut attempts: u32 = 0;
        loop {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return Err(FetchError::Cancelled);
            }

            let err = match op() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match err.class() {
                ErrorClass::RateLimit => {
                    let retry_after = match err {
                        FetchError::RateLimited { retry_after_secs } => retry_after_secs,
                        _ => 0,
                    };
                    let wait = self.rate_limit_delay(retry_after);
                    tracing::warn!(what, wait_ms = wait.as_millis() as u64, "rate limited, backing off");
                    std::thread::sleep(wait);
                }
                ErrorClass::Transient => {
                    attempts += 1;
                    if attempts >= self.max_attempts.max(1) {
                        tracing::warn!(what, attempts, error = %err, "retries exhausted");
                        return Err(err);
                    }
                    let wait = self.backoff(attempts);
                    tracing::debug!(what, attempts, error = %err, "transient failure, retrying");
                    std::thread::sleep(wait);
                }
                ErrorClass::Fatal | ErrorClass::Permanent => return Err(err),
            }
        }
    }
}

/// Enforces a minimum interval between consecutive requests of one worker.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Block until the interval since the previous request has elapsed.
    pub fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::immediate(3);
        let calls = Cell::new(0);
        let result = policy.run("page", None, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(FetchError::Server("502".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result, Ok(42));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::immediate(4);
        let calls = Cell::new(0);
        let result: Result<(), _> = policy.run("page", None, || {
            calls.set(calls.get() + 1);
            Err(FetchError::NetworkUnreachable("timeout".into()))
        });
        assert!(matches!(result, Err(FetchError::NetworkUnreachable(_))));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn rate_limits_do_not_consume_attempts() {
        let policy = RetryPolicy::immediate(1);
        let calls = Cell::new(0);
        let result = policy.run("page", None, || {
            calls.set(calls.get() + 1);
            if calls.get() <= 10 {
                Err(FetchError::RateLimited { retry_after_secs: 0 })
            } else {
                Ok("done")
            }
        });
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 11);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let policy = RetryPolicy::immediate(5);
        let calls = Cell::new(0);
        let result: Result<(), _> = policy.run("page", None, || {
            calls.set(calls.get() + 1);
            Err(FetchError::InvalidCredential("010".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cancel_flag_stops_before_calling() {
        let policy = RetryPolicy::immediate(5);
        let cancel = AtomicBool::new(true);
        let result: Result<(), _> = policy.run("page", Some(&cancel), || Ok(()));
        assert_eq!(result, Err(FetchError::Cancelled));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            rate_limit_wait: Duration::ZERO,
        };
        let first = policy.backoff(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        let third = policy.backoff(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));
        let capped = policy.backoff(12);
        assert!(capped >= Duration::from_millis(1000) && capped <= Duration::from_millis(1250));
    }
}
