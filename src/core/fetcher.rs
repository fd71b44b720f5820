//! Rate-limited fetcher.
//!
//! Wraps a single adapter call with a randomized politeness delay and
//! bounded exponential backoff. Holds only immutable configuration, so
//! one instance can be cloned into every worker.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::SourceError;

/// Uniform delay window applied before each outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolitenessBudget {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl PolitenessBudget {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    /// No delay at all (tests, local fixtures)
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Draw one delay from the window
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }

    /// Sleep for one sampled delay
    pub async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Retry policy for transient source failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, up to `max_attempts` in total
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculate delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Result of one call, classified for the retry decision
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    Transient(SourceError),
    Permanent(SourceError),
}

/// Final result of a fetch after retries
#[derive(Debug)]
pub enum FetchOutcome<T> {
    Fetched { value: T, attempts: u32 },

    /// Non-transient failure; never retried
    Malformed { reason: String },

    /// Still unavailable after the last permitted attempt
    Exhausted { attempts: u32, error: String },
}

/// Politeness-delayed, retrying wrapper around adapter calls
#[derive(Debug, Clone)]
pub struct Fetcher {
    politeness: PolitenessBudget,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(politeness: PolitenessBudget, retry: RetryPolicy) -> Self {
        Self { politeness, retry }
    }

    /// Pause for the politeness budget, then make exactly one call
    pub async fn attempt<T, F, Fut>(&self, call: F) -> Attempt<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        self.politeness.pause().await;

        match call().await {
            Ok(value) => Attempt::Success(value),
            Err(e) if e.is_transient() => Attempt::Transient(e),
            Err(e) => Attempt::Permanent(e),
        }
    }

    /// Call until success, a permanent failure, or the retry budget runs out
    pub async fn fetch<T, F, Fut>(&self, what: &str, mut call: F) -> FetchOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.attempt(&mut call).await {
                Attempt::Success(value) => {
                    return FetchOutcome::Fetched {
                        value,
                        attempts: attempt,
                    };
                }
                Attempt::Permanent(e) => {
                    debug!(what, error = %e, "Permanent source error, not retrying");
                    return FetchOutcome::Malformed {
                        reason: e.to_string(),
                    };
                }
                Attempt::Transient(e) => {
                    if !self.retry.should_retry(attempt) {
                        return FetchOutcome::Exhausted {
                            attempts: attempt,
                            error: e.to_string(),
                        };
                    }

                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Source unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
