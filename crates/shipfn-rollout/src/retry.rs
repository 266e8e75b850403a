//! Bounded exponential backoff for transient store, platform and sandbox
//! failures.
//!
//! Lower-level components never retry; the publisher wraps the calls it
//! knows are safe to repeat.

use std::time::Duration;

use shipfn_core::{ErrorKind, RetryConfig};
use shipfn_pack::BuildError;
use shipfn_platform::PlatformError;
use shipfn_store::StoreError;
use tracing::warn;

/// Errors that can be classified into the taxonomy.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        StoreError::kind(self)
    }
}

impl Classify for PlatformError {
    fn kind(&self) -> ErrorKind {
        PlatformError::kind(self)
    }
}

impl Classify for BuildError {
    fn kind(&self) -> ErrorKind {
        BuildError::kind(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Policy for store and platform calls.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
        }
    }

    /// Policy for starting the build sandbox.
    pub fn sandbox(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.sandbox_attempts.max(1),
            ..Self::from_config(config)
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.max(1.0).powi(exp);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Run `op`, retrying retryable failures until attempts run out.
    pub fn run<T, E>(&self, what: &str, mut op: impl FnMut() -> Result<T, E>) -> Result<T, E>
    where
        E: Classify + std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.kind().is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        op = what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
