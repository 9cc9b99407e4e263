//! Bounded retry for transient store errors.
//!
//! Retries happen at single-case granularity with exponential backoff.
//! Conflicts are never routed through here: a version mismatch means an
//! external writer changed the case, and the right response is to skip
//! it and re-evaluate on the next run.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            attempts: cfg.retry_attempts.max(1),
            base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
        }
    }
}

/// Run `op`, retrying transient failures up to `policy.attempts` times
/// total. The final error is returned to the caller, which records it
/// as a case-level failure.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    what: &str,
    mut op: impl FnMut() -> EngineResult<T>,
) -> EngineResult<T> {
    let mut delay = policy.base_delay;
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_transient() && attempt < policy.attempts => {
                log::warn!(
                    "transient store error on {what} (attempt {attempt}/{}): {err}; \
                     retrying in {delay:?}",
                    policy.attempts
                );
                thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            other => return other,
        }
    }
}
