//! Transaction configuration for an execution template.

use super::model::{Transaction, TransactionError};
use crate::errors::FlowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What a template invocation does with the transaction bound to its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionAction {
    /// Run without a transaction, suspending any bound one.
    #[default]
    None,
    /// Always begin a new transaction, suspending any bound one.
    AlwaysBegin,
    /// Join the bound transaction; fail if there is none.
    AlwaysJoin,
    /// Join the bound transaction or begin a new one.
    BeginOrJoin,
    /// Join the bound transaction; otherwise begin only if a factory is configured.
    Indifferent,
    /// Join the bound transaction; otherwise run without one.
    JoinIfPossible,
    /// Fail if a transaction is bound.
    Never,
}

impl TransactionAction {
    /// Returns true if the action may begin a transaction with no fallback.
    #[must_use]
    pub fn requires_factory(self) -> bool {
        matches!(self, Self::AlwaysBegin | Self::BeginOrJoin)
    }
}

impl fmt::Display for TransactionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::AlwaysBegin => "ALWAYS_BEGIN",
            Self::AlwaysJoin => "ALWAYS_JOIN",
            Self::BeginOrJoin => "BEGIN_OR_JOIN",
            Self::Indifferent => "INDIFFERENT",
            Self::JoinIfPossible => "JOIN_IF_POSSIBLE",
            Self::Never => "NEVER",
        };
        f.write_str(s)
    }
}

/// Creates transactions for an execution template.
pub trait TransactionFactory: Send + Sync + fmt::Debug {
    /// Creates and begins a transaction. The caller binds it.
    fn begin_transaction(&self) -> Result<Arc<dyn Transaction>, TransactionError>;

    /// Returns a transaction started outside the runtime, if any.
    fn join_external_transaction(&self) -> Result<Option<Arc<dyn Transaction>>, TransactionError> {
        Ok(None)
    }
}

/// Transaction settings of one execution template.
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// The action to take.
    pub action: TransactionAction,
    /// Source of new transactions.
    pub factory: Option<Arc<dyn TransactionFactory>>,
    /// Whether to bind a transaction started outside the runtime.
    pub interact_with_external: bool,
}

impl TransactionConfig {
    /// Creates a config with the given action and no factory.
    #[must_use]
    pub fn new(action: TransactionAction) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }

    /// Sets the factory.
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn TransactionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Enables joining external transactions.
    #[must_use]
    pub fn with_interact_with_external(mut self, interact: bool) -> Self {
        self.interact_with_external = interact;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.factory.is_none() {
            if self.action.requires_factory() {
                return Err(FlowError::configuration(format!(
                    "transaction action {} requires a transaction factory",
                    self.action
                )));
            }
            if self.interact_with_external {
                return Err(FlowError::configuration(
                    "interacting with external transactions requires a transaction factory",
                ));
            }
        }
        Ok(())
    }
}

/// Serializable subset of [`TransactionConfig`]; the factory is supplied in code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionSettings {
    /// The action to take.
    pub action: TransactionAction,
    /// Whether to bind a transaction started outside the runtime.
    pub interact_with_external: bool,
}

impl TransactionSettings {
    /// Builds a [`TransactionConfig`] using `factory`.
    #[must_use]
    pub fn into_config(self, factory: Option<Arc<dyn TransactionFactory>>) -> TransactionConfig {
        TransactionConfig {
            action: self.action,
            factory,
            interact_with_external: self.interact_with_external,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::LocalTransactionFactory;

    #[test]
    fn test_begin_actions_require_factory() {
        for action in [TransactionAction::AlwaysBegin, TransactionAction::BeginOrJoin] {
            let err = TransactionConfig::new(action).validate().unwrap_err();
            assert!(matches!(err, FlowError::Configuration(_)));
        }

        let config = TransactionConfig::new(TransactionAction::AlwaysBegin)
            .with_factory(Arc::new(LocalTransactionFactory::new()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_indifferent_without_factory_is_valid() {
        assert!(TransactionConfig::new(TransactionAction::Indifferent)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_external_interaction_requires_factory() {
        let config =
            TransactionConfig::new(TransactionAction::None).with_interact_with_external(true);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_action_serde_names() {
        let action: TransactionAction = serde_json::from_str("\"BEGIN_OR_JOIN\"").unwrap();
        assert_eq!(action, TransactionAction::BeginOrJoin);
        assert_eq!(action.to_string(), "BEGIN_OR_JOIN");

        let settings: TransactionSettings =
            serde_json::from_str(r#"{"action": "JOIN_IF_POSSIBLE", "interactWithExternal": true}"#)
                .unwrap();
        assert_eq!(settings.action, TransactionAction::JoinIfPossible);
        assert!(settings.interact_with_external);
    }
}
