//! Retry with exponential backoff for collaborator calls.
//!
//! Retries only transient failures ([`GatewayError::is_transient`]).
//! Rejections and not-found answers are returned immediately.

use std::time::Duration;

use crate::error::GatewayError;

/// Default number of retries after the initial call.
pub const MAX_RETRIES: u32 = 3;

/// Default base delay between retries (doubles each attempt: 200ms, 400ms,
/// 800ms).
pub const BASE_DELAY_MS: u64 = 200;

/// Backoff policy for collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial call.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Call `f` up to `max_retries + 1` times, sleeping between transient
    /// failures.
    pub fn run<T>(
        &self,
        operation: &'static str,
        mut f: impl FnMut() -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        for attempt in 0..self.max_retries {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        "collaborator call failed, retrying in {delay:?}: {e}"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
        // Final attempt; no more retries.
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    fn unavailable() -> GatewayError {
        GatewayError::Unavailable {
            service: "arkiv",
            reason: "timeout".into(),
        }
    }

    #[test]
    fn exhausts_all_attempts_on_transient_failure() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast(3).run("test", || {
            calls.set(calls.get() + 1);
            Err(unavailable())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = fast(3).run("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(unavailable())
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn rejection_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast(3).run("test", || {
            calls.set(calls.get() + 1);
            Err(GatewayError::Rejected {
                service: "arkiv",
                reason: "bad".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(800));
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}
