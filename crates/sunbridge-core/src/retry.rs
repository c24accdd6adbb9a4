// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Retry and backoff policies for the device pollers.
//!
//! Two shapes of recovery live here:
//!
//! - [`RetryStrategy`] with [`FixedDelay`] for bounded retries of operations
//!   that either work soon or not at all (initial connects).
//! - [`Backoff`], a stateful delay sequence for the unbounded reconnect loop:
//!   exponential growth from an initial delay to a cap, reset on success.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BleError;

// =============================================================================
// Retry Configuration
// =============================================================================

/// Configuration for retry strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before the first retry.
    #[serde(default = "default_initial_delay", with = "duration_millis")]
    pub initial_delay: Duration,

    /// Maximum delay between retries.
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0) to randomize delays.
    #[serde(default)]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(120)
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the jitter factor.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

// Duration serialization helper
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// =============================================================================
// Retry Decision
// =============================================================================

/// Decision on whether to retry an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// Do not retry, return the error.
    DoNotRetry,
}

// =============================================================================
// Retry Strategy Trait
// =============================================================================

/// A strategy for determining when and how to retry failed operations.
#[async_trait]
pub trait RetryStrategy: Send + Sync {
    /// Returns the name of this strategy for logging.
    fn name(&self) -> &str;

    /// Determines whether to retry after a failure.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn should_retry(&self, error: &BleError, attempt: u32) -> RetryDecision;

    /// Executes an async operation with retry logic.
    async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, BleError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, BleError>> + Send,
        T: Send,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => match self.should_retry(&error, attempt) {
                    RetryDecision::Retry(delay) => {
                        tracing::debug!(
                            strategy = %self.name(),
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Retrying operation"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry => {
                        return Err(error);
                    }
                },
            }
        }
    }
}

// =============================================================================
// Fixed Delay Strategy
// =============================================================================

/// A strategy that waits a fixed duration between retries.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    config: RetryConfig,
}

impl FixedDelay {
    /// Creates a new fixed delay strategy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Creates a simple fixed delay strategy.
    pub fn simple(max_attempts: u32, delay: Duration) -> Self {
        Self {
            config: RetryConfig {
                max_attempts,
                initial_delay: delay,
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl RetryStrategy for FixedDelay {
    fn name(&self) -> &str {
        "fixed_delay"
    }

    fn should_retry(&self, error: &BleError, attempt: u32) -> RetryDecision {
        if attempt >= self.config.max_attempts || !error.is_retryable() {
            return RetryDecision::DoNotRetry;
        }

        RetryDecision::Retry(apply_jitter(self.config.initial_delay, self.config.jitter))
    }
}

// =============================================================================
// Backoff
// =============================================================================

/// A stateful exponential delay sequence for the reconnect loop.
///
/// Unlike [`RetryStrategy`], this never gives up: the reconnect loop runs
/// until shutdown. The caller asks for the next delay after each failure and
/// resets after a success.
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    failures: AtomicU32,
}

impl Backoff {
    /// Creates a backoff sequence from a retry configuration.
    ///
    /// Only the delay fields are used; `max_attempts` is ignored.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: AtomicU32::new(0),
        }
    }

    /// Returns the delay to wait before the next attempt and advances the
    /// sequence.
    pub fn next_delay(&self) -> Duration {
        let attempt = self.failures.fetch_add(1, Ordering::Relaxed);
        let base = self.config.initial_delay.as_millis() as f64;
        let multiplied = base * self.config.multiplier.powi(attempt.min(16) as i32);
        let capped = multiplied.min(self.config.max_delay.as_millis() as f64);

        apply_jitter(Duration::from_millis(capped as u64), self.config.jitter)
    }

    /// Resets the sequence after a successful attempt.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// Returns the number of consecutive failures recorded.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Applies jitter to a duration.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let millis = duration.as_millis() as f64;
    let jitter_range = millis * jitter_factor;
    let random = (simple_random() as f64 / u32::MAX as f64) * 2.0 - 1.0; // -1.0 to 1.0
    let jittered = millis + (random * jitter_range);

    Duration::from_millis(jittered.max(0.0) as u64)
}

/// Simple pseudo-random number generator (not cryptographically secure).
/// Uses a basic xorshift algorithm for lightweight randomness.
fn simple_random() -> u32 {
    use std::time::SystemTime;

    static SEED: AtomicU32 = AtomicU32::new(0);

    let mut x = SEED.load(Ordering::Relaxed);
    if x == 0 {
        x = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(12345);
    }

    // Xorshift32
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;

    SEED.store(x, Ordering::Relaxed);
    x
}

// =============================================================================
// Tests
// =============================================================================
