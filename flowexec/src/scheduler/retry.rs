//! Bounded retry of submissions refused by a saturated scheduler.
//!
//! A refused task is never consumed, so retrying the same scheduler runs it
//! at most once.

use super::executor::{Reservation, Scheduler, SchedulerError, TaskHandle};
use crate::errors::FlowError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    #[default]
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// How often and how fast to retry a refused submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RejectionRetryConfig {
    /// Consecutive rejections tolerated before failing with overload.
    pub max_rejections: usize,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RejectionRetryConfig {
    fn default() -> Self {
        Self {
            max_rejections: 32,
            base_delay_ms: 1,
            max_delay_ms: 50,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Equal,
        }
    }
}

impl RejectionRetryConfig {
    /// Creates the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rejection limit.
    #[must_use]
    pub fn with_max_rejections(mut self, max: usize) -> Self {
        self.max_rejections = max;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.max_rejections == 0 {
            return Err(FlowError::configuration(
                "maxRejections must be at least 1",
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(FlowError::configuration(
                "baseDelayMs must not exceed maxDelayMs",
            ));
        }
        Ok(())
    }
}

/// Delay state across the attempts of one submission.
#[derive(Debug, Default)]
pub struct BackoffState {
    attempt: u32,
    previous_delay_ms: Option<u64>,
}

impl BackoffState {
    /// Creates a fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of delays computed so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Computes the delay before the next attempt and advances the state.
    pub fn next_delay(&mut self, config: &RejectionRetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(self.attempt)).min(max)
            }
            BackoffStrategy::Linear => {
                base.saturating_mul(u64::from(self.attempt) + 1).min(max)
            }
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delay_ms.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                }
            }
        };

        self.previous_delay_ms = Some(jittered);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(jittered)
    }
}

/// Reserves capacity on `scheduler`, retrying the same scheduler with
/// backoff while it is saturated.
///
/// Fails with [`FlowError::Overload`] after `max_rejections` consecutive
/// rejections and with [`FlowError::Disposed`] if the scheduler is stopped.
/// Delays block the calling thread. The caller keeps ownership of its task
/// until the reservation is spawned.
pub fn reserve_with_retry<'a>(
    scheduler: &'a Scheduler,
    config: &RejectionRetryConfig,
) -> Result<Reservation<'a>, FlowError> {
    let mut state = BackoffState::new();
    let mut rejections = 0usize;

    loop {
        match scheduler.try_reserve() {
            Ok(reservation) => {
                if rejections > 0 {
                    debug!(
                        scheduler = scheduler.name(),
                        rejections,
                        "Submission accepted after retry"
                    );
                }
                return Ok(reservation);
            }
            Err(SchedulerError::Rejected { scheduler: name }) => {
                rejections += 1;
                if rejections >= config.max_rejections {
                    warn!(scheduler = %name, attempts = rejections, "Scheduler overloaded");
                    return Err(FlowError::Overload {
                        scheduler: name,
                        attempts: rejections,
                    });
                }
                let delay = state.next_delay(config);
                debug!(
                    scheduler = %name,
                    attempt = rejections,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Submission rejected, retrying"
                );
                std::thread::sleep(delay);
            }
            Err(err @ SchedulerError::Stopped { .. }) => return Err(err.into()),
        }
    }
}

/// Submits `task` through [`reserve_with_retry`]. The task is spawned at
/// most once and dropped unrun on failure.
pub fn submit_with_retry<F>(
    scheduler: &Scheduler,
    config: &RejectionRetryConfig,
    task: F,
) -> Result<TaskHandle, FlowError>
where
    F: FnOnce() + Send + 'static,
{
    Ok(reserve_with_retry(scheduler, config)?.spawn(task))
}
