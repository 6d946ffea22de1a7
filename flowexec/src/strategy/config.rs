//! Configuration of a processing strategy.

use crate::errors::FlowError;
use crate::scheduler::RejectionRetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The available strategy variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Every step on the calling thread.
    Direct,
    /// The whole pipeline as one task on the I/O pool.
    WorkQueue,
    /// A dedicated event loop offloading blocking and intensive steps.
    EventLoop,
    /// The light pool offloading blocking and intensive steps.
    #[default]
    Proactor,
    /// Ring buffer, then the whole pipeline on one light thread.
    StreamReactor,
    /// Ring buffer, then the proactor chain.
    StreamProactor,
    /// Ring buffer, then the whole pipeline on one I/O thread.
    StreamWorkQueue,
}

impl StrategyKind {
    /// Returns true for the ring-buffer variants.
    #[must_use]
    pub fn is_stream(self) -> bool {
        matches!(
            self,
            Self::StreamReactor | Self::StreamProactor | Self::StreamWorkQueue
        )
    }

    /// The transaction policy used when none is configured.
    #[must_use]
    pub fn default_transaction_policy(self) -> TransactionPolicy {
        match self {
            Self::Proactor => TransactionPolicy::Synchronous,
            _ => TransactionPolicy::FailFast,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Direct => "direct",
            Self::WorkQueue => "work-queue",
            Self::EventLoop => "event-loop",
            Self::Proactor => "proactor",
            Self::StreamReactor => "stream-reactor",
            Self::StreamProactor => "stream-proactor",
            Self::StreamWorkQueue => "stream-work-queue",
        };
        f.write_str(s)
    }
}

/// What a run does when the concurrency ceiling or the ring buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackPressureStrategy {
    /// Block the submitter until capacity frees up.
    #[default]
    Wait,
    /// Fail the run with overload.
    Fail,
}

/// What a run does when the calling thread has a transaction bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionPolicy {
    /// Fail before any step runs.
    FailFast,
    /// Run every step on the calling thread.
    Synchronous,
}

/// Settings of one processing strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyConfig {
    /// Strategy name; prefixes the custom pools it creates.
    pub name: String,
    /// The variant.
    pub kind: StrategyKind,
    /// Maximum in-flight invocations. Absent means unbounded.
    pub max_concurrency: Option<usize>,
    /// Ring buffer capacity of the stream variants.
    pub buffer_size: usize,
    /// Subscriber loops draining the ring buffer.
    pub subscriber_count: usize,
    /// Threads of the event loop.
    pub event_loop_threads: usize,
    /// Threads running fire-and-forget steps.
    pub fire_and_forget_threads: usize,
    /// Behavior when saturated.
    pub back_pressure: BackPressureStrategy,
    /// Behavior under an active transaction. Absent means the kind's default.
    pub transaction_policy: Option<TransactionPolicy>,
    /// Retry of submissions refused by a saturated pool.
    pub rejection_retry: RejectionRetryConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map_or(2, std::num::NonZeroUsize::get);
        Self {
            name: "default".to_string(),
            kind: StrategyKind::default(),
            max_concurrency: None,
            buffer_size: 256,
            subscriber_count: 2,
            event_loop_threads: cores,
            fire_and_forget_threads: 2,
            back_pressure: BackPressureStrategy::Wait,
            transaction_policy: None,
            rejection_retry: RejectionRetryConfig::default(),
        }
    }
}

impl StrategyConfig {
    /// Creates a config for `kind` named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StrategyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    /// Sets the concurrency ceiling.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    /// Sets the ring buffer capacity.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the number of subscriber loops.
    #[must_use]
    pub fn with_subscriber_count(mut self, count: usize) -> Self {
        self.subscriber_count = count;
        self
    }

    /// Sets the event loop size.
    #[must_use]
    pub fn with_event_loop_threads(mut self, threads: usize) -> Self {
        self.event_loop_threads = threads;
        self
    }

    /// Sets the back-pressure strategy.
    #[must_use]
    pub fn with_back_pressure(mut self, strategy: BackPressureStrategy) -> Self {
        self.back_pressure = strategy;
        self
    }

    /// Sets the transaction policy.
    #[must_use]
    pub fn with_transaction_policy(mut self, policy: TransactionPolicy) -> Self {
        self.transaction_policy = Some(policy);
        self
    }

    /// Sets the rejection retry.
    #[must_use]
    pub fn with_rejection_retry(mut self, retry: RejectionRetryConfig) -> Self {
        self.rejection_retry = retry;
        self
    }

    /// The configured transaction policy or the kind's default.
    #[must_use]
    pub fn effective_transaction_policy(&self) -> TransactionPolicy {
        self.transaction_policy
            .unwrap_or_else(|| self.kind.default_transaction_policy())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.name.trim().is_empty() {
            return Err(FlowError::configuration("strategy name must not be empty"));
        }
        if self.max_concurrency == Some(0) {
            return Err(FlowError::configuration("maxConcurrency must be at least 1"));
        }
        for (field, value) in [
            ("bufferSize", self.buffer_size),
            ("subscriberCount", self.subscriber_count),
            ("eventLoopThreads", self.event_loop_threads),
            ("fireAndForgetThreads", self.fire_and_forget_threads),
        ] {
            if value == 0 {
                return Err(FlowError::configuration(format!("{field} must be at least 1")));
            }
        }
        self.rejection_retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transaction_policies() {
        assert_eq!(
            StrategyKind::Proactor.default_transaction_policy(),
            TransactionPolicy::Synchronous
        );
        for kind in [
            StrategyKind::Direct,
            StrategyKind::WorkQueue,
            StrategyKind::EventLoop,
            StrategyKind::StreamProactor,
        ] {
            assert_eq!(kind.default_transaction_policy(), TransactionPolicy::FailFast);
        }

        let config = StrategyConfig::new("x", StrategyKind::Direct)
            .with_transaction_policy(TransactionPolicy::Synchronous);
        assert_eq!(
            config.effective_transaction_policy(),
            TransactionPolicy::Synchronous
        );
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        assert!(StrategyConfig::default().validate().is_ok());
        assert!(StrategyConfig::default().with_max_concurrency(0).validate().is_err());
        assert!(StrategyConfig::default().with_buffer_size(0).validate().is_err());
        assert!(StrategyConfig::default().with_subscriber_count(0).validate().is_err());
        assert!(StrategyConfig::new(" ", StrategyKind::Direct).validate().is_err());
    }

    #[test]
    fn test_deserialize() {
        let config: StrategyConfig = serde_json::from_str(
            r#"{"name": "orders", "kind": "stream-proactor", "maxConcurrency": 4,
                "backPressure": "fail", "transactionPolicy": "fail-fast",
                "rejectionRetry": {"maxRejections": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.kind, StrategyKind::StreamProactor);
        assert!(config.kind.is_stream());
        assert_eq!(config.max_concurrency, Some(4));
        assert_eq!(config.back_pressure, BackPressureStrategy::Fail);
        assert_eq!(config.rejection_retry.max_rejections, 5);
        assert_eq!(config.rejection_retry.max_delay_ms, 50);
    }
}
