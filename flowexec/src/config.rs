//! Runtime configuration loaded from JSON.

use crate::errors::FlowError;
use crate::execution::{ExecutionTemplate, TransactionFilters};
use crate::observability::TracingConfig;
use crate::scheduler::{PoolsConfig, SchedulerPools};
use crate::strategy::{ProcessingStrategy, StrategyConfig};
use crate::transaction::{TransactionFactory, TransactionSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Rollback and commit filter expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorHandlingConfig {
    /// Errors that force a rollback.
    pub rollback_filter: Option<String>,
    /// Errors that still allow a commit.
    pub commit_filter: Option<String>,
}

impl ErrorHandlingConfig {
    /// Parses both expressions.
    pub fn filters(&self) -> Result<TransactionFilters, FlowError> {
        TransactionFilters::from_expressions(
            self.rollback_filter.as_deref(),
            self.commit_filter.as_deref(),
        )
    }
}

/// Everything needed to assemble pools, a strategy and an execution template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Scheduler pool sizing.
    pub pools: PoolsConfig,
    /// Processing strategy.
    pub strategy: StrategyConfig,
    /// Transaction action and external interaction.
    pub transaction: TransactionSettings,
    /// Commit/rollback classification.
    pub error_handling: ErrorHandlingConfig,
    /// Log subscriber settings.
    pub tracing: TracingConfig,
}

impl RuntimeConfig {
    /// Parses a JSON document and validates it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, FlowError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FlowError::configuration(format!("invalid runtime config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            FlowError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loading runtime config");
        Self::from_json_str(&json)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), FlowError> {
        self.pools.validate()?;
        self.strategy.validate()?;
        self.error_handling.filters()?;
        Ok(())
    }

    /// Starts the configured scheduler pools.
    pub fn build_pools(&self) -> Result<Arc<SchedulerPools>, FlowError> {
        Ok(Arc::new(SchedulerPools::new(&self.pools)?))
    }

    /// Creates the configured strategy on `pools`.
    pub fn build_strategy(
        &self,
        pools: Arc<SchedulerPools>,
    ) -> Result<ProcessingStrategy, FlowError> {
        ProcessingStrategy::new(self.strategy.clone(), pools)
    }

    /// Creates an execution template using `factory` for new transactions.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a filter is invalid or the action
    /// needs a factory and none was given.
    pub fn build_template(
        &self,
        factory: Option<Arc<dyn TransactionFactory>>,
    ) -> Result<ExecutionTemplate, FlowError> {
        let config = self.transaction.into_config(factory);
        config.validate()?;
        Ok(ExecutionTemplate::new(config).with_filters(self.error_handling.filters()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorType;
    use crate::scheduler::RejectionPolicy;
    use crate::strategy::{BackPressureStrategy, StrategyKind, TransactionPolicy};
    use crate::transaction::{LocalTransactionFactory, TransactionAction};
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const FULL: &str = r#"{
        "pools": {
            "light": {"threads": 2, "queueCapacity": 16, "rejectionPolicy": "reject"},
            "io": {"threads": 3, "queueCapacity": 8},
            "intensive": {"threads": 1, "rejectionPolicy": "grow"}
        },
        "strategy": {
            "name": "orders",
            "kind": "stream-proactor",
            "maxConcurrency": 8,
            "bufferSize": 64,
            "backPressure": "fail",
            "transactionPolicy": "synchronous",
            "rejectionRetry": {"maxRejections": 5, "baseDelayMs": 2, "maxDelayMs": 20}
        },
        "transaction": {"action": "BEGIN_OR_JOIN", "interactWithExternal": true},
        "errorHandling": {"rollbackFilter": "db.*", "commitFilter": "validation+"},
        "tracing": {"level": "debug", "json": true}
    }"#;

    #[test]
    fn test_parse_full_document() {
        let config = RuntimeConfig::from_json_str(FULL).unwrap();

        assert_eq!(config.pools.light.threads, 2);
        assert_eq!(config.pools.io.queue_capacity, 8);
        assert_eq!(config.pools.intensive.rejection_policy, RejectionPolicy::Grow);
        assert_eq!(config.strategy.name, "orders");
        assert_eq!(config.strategy.kind, StrategyKind::StreamProactor);
        assert_eq!(config.strategy.max_concurrency, Some(8));
        assert_eq!(config.strategy.subscriber_count, 2);
        assert_eq!(config.strategy.back_pressure, BackPressureStrategy::Fail);
        assert_eq!(
            config.strategy.transaction_policy,
            Some(TransactionPolicy::Synchronous)
        );
        assert_eq!(config.strategy.rejection_retry.max_rejections, 5);
        assert_eq!(config.transaction.action, TransactionAction::BeginOrJoin);
        assert!(config.transaction.interact_with_external);
        assert_eq!(config.error_handling.rollback_filter.as_deref(), Some("db.*"));
        assert!(config.tracing.json);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = RuntimeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.strategy.kind, StrategyKind::Proactor);
        assert_eq!(config.transaction.action, TransactionAction::None);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = RuntimeConfig::from_json_str(r#"{"strategy": {"bufferSize": 0}}"#).unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));

        let err =
            RuntimeConfig::from_json_str(r#"{"pools": {"io": {"threads": 0}}}"#).unwrap_err();
        assert!(err.to_string().contains("io"));

        let err = RuntimeConfig::from_json_str(r#"{"strategy": {"kind": "fastest"}}"#).unwrap_err();
        assert!(err.is_usage_error());

        let err = RuntimeConfig::from_json_str(
            r#"{"errorHandling": {"rollbackFilter": "*+"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.strategy.name, "orders");

        let missing = file.path().with_extension("missing");
        let err = RuntimeConfig::from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn test_build_template_applies_filters() {
        let config = RuntimeConfig::from_json_str(FULL).unwrap();
        let factory: Arc<dyn TransactionFactory> = Arc::new(LocalTransactionFactory::new());

        let template = config.build_template(Some(factory)).unwrap();
        assert_eq!(template.config().action, TransactionAction::BeginOrJoin);
        assert!(template
            .filters()
            .should_rollback(&ErrorType::new("db.deadlock")));
        assert!(!template
            .filters()
            .should_rollback(&ErrorType::new("validation")));

        assert!(config.build_template(None).is_err());
    }

    #[test]
    fn test_build_pools_and_strategy() {
        let config = RuntimeConfig::from_json_str(FULL).unwrap();
        let pools = config.build_pools().unwrap();
        assert_eq!(pools.io().config().threads, 3);

        let strategy = config.build_strategy(pools).unwrap();
        assert_eq!(strategy.name(), "orders");
        assert!(strategy.dispose(std::time::Duration::from_secs(1)));
    }
}
