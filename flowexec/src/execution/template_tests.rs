//! Tests for the execution template.

#[cfg(test)]
mod tests {
    use crate::core::{Event, Outcome, ProcessingType};
    use crate::errors::{ErrorType, FlowError, StepError};
    use crate::execution::{
        ContinueExceptionHandler, ExceptionFilter, ExecutionTemplate, MockExceptionHandler,
        ProcessingException, TransactionFilters,
    };
    use crate::pipeline::PipelineBuilder;
    use crate::strategy::{ProcessingStrategy, StrategyConfig, StrategyKind};
    use crate::testing::{
        active_transaction, assert_committed_once, assert_failed_with, assert_handled,
        assert_rolled_back_once, assert_success, assert_unresolved, small_pools, test_event,
        trail, FixedTransactionFactory, RecordingExceptionHandler, RecordingStep,
        ThreadRecorder,
    };
    use crate::transaction::{
        Transaction, TransactionAction, TransactionConfig, TransactionRegistry,
        TransactionResource, TransactionStatus,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn template(
        action: TransactionAction,
        factory: &Arc<FixedTransactionFactory>,
    ) -> ExecutionTemplate {
        ExecutionTemplate::new(TransactionConfig::new(action).with_factory(factory.clone()))
    }

    fn step_failure(event: Event, error_type: ErrorType) -> ProcessingException {
        ProcessingException::new(
            event,
            FlowError::step("persist", StepError::typed(error_type, "write failed")),
        )
    }

    fn fail_with(
        error_type: ErrorType,
    ) -> impl FnOnce(Event) -> Result<Event, ProcessingException> {
        move |event| Err(step_failure(event, error_type))
    }

    #[derive(Debug)]
    struct BrokenCommitResource;

    impl TransactionResource for BrokenCommitResource {
        fn commit(&self) -> Result<(), String> {
            Err("connection reset".to_string())
        }

        fn rollback(&self) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn test_always_begin_rolls_back_failed_callback() {
        TransactionRegistry::clear();
        let factory = Arc::new(FixedTransactionFactory::new());
        let template = template(TransactionAction::AlwaysBegin, &factory);

        let outcome = template.execute(test_event(), fail_with(ErrorType::step()));

        assert_failed_with(&outcome, "step");
        let tx = factory.last().unwrap();
        assert_rolled_back_once(&tx);
        assert_eq!(tx.status(), TransactionStatus::RolledBack);
        assert!(!TransactionRegistry::is_active());
    }

    #[test]
    fn test_always_begin_commits_on_success() {
        TransactionRegistry::clear();
        let factory = Arc::new(FixedTransactionFactory::new());
        let template = template(TransactionAction::AlwaysBegin, &factory);

        let outcome = template.execute(test_event(), |event| {
            assert!(TransactionRegistry::is_active());
            Ok(event.with_variable("saved", json!(true)))
        });

        let event = assert_success(&outcome);
        assert_eq!(event.variable("saved"), Some(&json!(true)));
        assert_committed_once(&factory.last().unwrap());
        assert!(!TransactionRegistry::is_active());
    }

    #[test]
    fn test_nested_join_marks_outer_rollback_only() {
        TransactionRegistry::clear();
        let factory = Arc::new(FixedTransactionFactory::new());
        let outer = template(TransactionAction::AlwaysBegin, &factory);
        let inner = template(TransactionAction::BeginOrJoin, &factory);

        let outcome = outer.execute(test_event(), |event| {
            let outer_id = TransactionRegistry::current().unwrap().id();
            let nested = inner.execute(event.clone(), |event| {
                assert_eq!(TransactionRegistry::current().unwrap().id(), outer_id);
                Err(step_failure(event, ErrorType::step()))
            });
            assert!(nested.is_failed());
            assert!(TransactionRegistry::current().unwrap().is_rollback_only());
            Ok(event)
        });

        assert_success(&outcome);
        assert_eq!(factory.created().len(), 1);
        assert_rolled_back_once(&factory.last().unwrap());
        assert!(!TransactionRegistry::is_active());
    }

    #[test]
    fn test_nested_success_leaves_resolution_to_owner() {
        TransactionRegistry::clear();
        let factory = Arc::new(FixedTransactionFactory::new());
        let outer = template(TransactionAction::AlwaysBegin, &factory);
        let inner = template(TransactionAction::JoinIfPossible, &factory);

        let outcome = outer.execute(test_event(), |event| {
            let tx = factory.last().unwrap();
            let nested = inner.execute(event, Ok);
            assert_unresolved(&tx);
            nested.into_result()
        });

        assert_success(&outcome);
        assert_committed_once(&factory.last().unwrap());
    }

    #[test]
    fn test_none_suspends_and_resumes_outer_transaction() {
        TransactionRegistry::clear();
        let outer = active_transaction().unwrap();
        TransactionRegistry::bind(outer.clone()).unwrap();
        let template = ExecutionTemplate::new(TransactionConfig::new(TransactionAction::None));

        let outcome = template.execute(test_event(), |event| {
            assert!(!TransactionRegistry::is_active());
            Ok(event)
        });

        assert_success(&outcome);
        assert_eq!(TransactionRegistry::current().unwrap().id(), outer.id());
        assert_eq!((outer.suspend_count(), outer.resume_count()), (1, 1));
        assert_eq!(outer.status(), TransactionStatus::Active);
        assert_unresolved(&outer);
        TransactionRegistry::clear();
    }

    #[test]
    fn test_always_begin_under_outer_transaction_owns_a_new_one() {
        TransactionRegistry::clear();
        let outer = active_transaction().unwrap();
        TransactionRegistry::bind(outer.clone()).unwrap();
        let factory = Arc::new(FixedTransactionFactory::new());
        let template = template(TransactionAction::AlwaysBegin, &factory);

        let outcome = template.execute(test_event(), |event| {
            let current = TransactionRegistry::current().unwrap();
            assert_ne!(current.id(), outer.id());
            Ok(event)
        });

        assert_success(&outcome);
        assert_committed_once(&factory.last().unwrap());
        assert_eq!(TransactionRegistry::current().unwrap().id(), outer.id());
        assert_unresolved(&outer);
        assert_eq!(outer.resume_count(), 1);
        TransactionRegistry::clear();
    }

    #[test]
    fn test_outer_transaction_resumed_after_inner_failure() {
        TransactionRegistry::clear();
        let outer = active_transaction().unwrap();
        TransactionRegistry::bind(outer.clone()).unwrap();
        let factory = Arc::new(FixedTransactionFactory::new());
        let template = template(TransactionAction::AlwaysBegin, &factory)
            .with_exception_handler(Arc::new(ContinueExceptionHandler));

        let outcome = template.execute(test_event(), fail_with(ErrorType::step()));

        assert_handled(&outcome);
        assert_rolled_back_once(&factory.last().unwrap());
        assert_eq!(TransactionRegistry::current().unwrap().id(), outer.id());
        assert!(!outer.is_rollback_only());
        TransactionRegistry::clear();
    }

    #[test]
    fn test_never_with_active_transaction_skips_handler() {
        TransactionRegistry::clear();
        let outer = active_transaction().unwrap();
        TransactionRegistry::bind(outer.clone()).unwrap();
        let handler = Arc::new(RecordingExceptionHandler::handling());
        let template = ExecutionTemplate::new(TransactionConfig::new(TransactionAction::Never))
            .with_exception_handler(handler.clone());

        let outcome = template.execute(test_event(), |_| panic!("callback must not run"));

        assert_failed_with(&outcome, "runtime.transaction.usage");
        assert_eq!(handler.call_count(), 0);
        assert_eq!(TransactionRegistry::current().unwrap().id(), outer.id());
        assert_unresolved(&outer);
        TransactionRegistry::clear();
    }

    #[test]
    fn test_always_join_without_transaction_is_usage_error() {
        TransactionRegistry::clear();
        let handler = Arc::new(RecordingExceptionHandler::handling());
        let template = ExecutionTemplate::new(TransactionConfig::new(TransactionAction::AlwaysJoin))
            .with_exception_handler(handler.clone());

        let outcome = template.execute(test_event(), Ok);

        let exception = assert_failed_with(&outcome, "runtime.transaction.usage");
        assert!(exception.is_usage_error());
        assert_eq!(handler.call_count(), 0);
    }

    #[test]
    fn test_missing_factory_is_configuration_error() {
        TransactionRegistry::clear();
        let template =
            ExecutionTemplate::new(TransactionConfig::new(TransactionAction::AlwaysBegin));

        let outcome = template.execute(test_event(), |_| panic!("callback must not run"));

        assert_failed_with(&outcome, "runtime.configuration");
        assert!(!TransactionRegistry::is_active());
    }

    #[test]
    fn test_indifferent_without_factory_runs_unbound() {
        TransactionRegistry::clear();
        let template =
            ExecutionTemplate::new(TransactionConfig::new(TransactionAction::Indifferent));

        let outcome = template.execute(test_event(), |event| {
            assert!(!TransactionRegistry::is_active());
            Ok(event)
        });

        assert_success(&outcome);
    }

    #[test]
    fn test_commit_filter_commits_matching_failures() {
        TransactionRegistry::clear();
        let factory = Arc::new(FixedTransactionFactory::new());
        let template = template(TransactionAction::AlwaysBegin, &factory).with_filters(
            TransactionFilters::new().with_commit(ExceptionFilter::new("validation.*").unwrap()),
        );

        let outcome =
            template.execute(test_event(), fail_with(ErrorType::new("validation.amount")));
        assert!(outcome.is_failed());
        assert_committed_once(&factory.last().unwrap());

        let outcome = template.execute(test_event(), fail_with(ErrorType::new("db.timeout")));
        assert!(outcome.is_failed());
        assert_rolled_back_once(&factory.last().unwrap());
    }

    #[test]
    fn test_rollback_filter_matches_hierarchy() {
        TransactionRegistry::clear();
        let factory = Arc::new(FixedTransactionFactory::new());
        let template = template(TransactionAction::AlwaysBegin, &factory).with_filters(
            TransactionFilters::from_expressions(Some("db+"), None).unwrap(),
        );

        let db_timeout = ErrorType::new("db").child("db.timeout");
        template.execute(test_event(), fail_with(db_timeout));
        assert_rolled_back_once(&factory.last().unwrap());

        template.execute(test_event(), fail_with(ErrorType::new("validation")));
        assert_committed_once(&factory.last().unwrap());
    }

    #[test]
    fn test_rollback_wins_when_both_filters_match() {
        TransactionRegistry::clear();
        let factory = Arc::new(FixedTransactionFactory::new());
        let template = template(TransactionAction::AlwaysBegin, &factory).with_filters(
            TransactionFilters::from_expressions(Some("db.*"), Some("db.*")).unwrap(),
        );

        template.execute(test_event(), fail_with(ErrorType::new("db.deadlock")));
        assert_rolled_back_once(&factory.last().unwrap());
    }

    #[test]
    fn test_handled_outcome_still_rolls_back() {
        TransactionRegistry::clear();
        let factory = Arc::new(FixedTransactionFactory::new());
        let handler = Arc::new(RecordingExceptionHandler::handling());
        let template = template(TransactionAction::AlwaysBegin, &factory)
            .with_exception_handler(handler.clone());

        let outcome = template.execute(test_event(), fail_with(ErrorType::step()));

        let event = assert_handled(&outcome);
        assert_eq!(event.variable("handled_by"), Some(&json!("recording")));
        assert!(event.error().is_some());
        assert_eq!(handler.error_types(), vec!["step"]);
        assert_eq!(handler.calls()[0].failing_step.as_deref(), Some("persist"));
        assert_rolled_back_once(&factory.last().unwrap());
    }

    #[test]
    fn test_propagated_failure_carries_handler_event() {
        TransactionRegistry::clear();
        let mut handler = MockExceptionHandler::new();
        handler
            .expect_handle_exception()
            .times(1)
            .returning(|_exception, event| event.clone().with_variable("seen", json!(true)));
        let template = ExecutionTemplate::new(TransactionConfig::new(TransactionAction::None))
            .with_exception_handler(Arc::new(handler));

        let outcome = template.execute(test_event(), fail_with(ErrorType::step()));

        let exception = assert_failed_with(&outcome, "step");
        assert_eq!(exception.processed_event().variable("seen"), Some(&json!(true)));
        assert!(exception.event().variable("seen").is_none());
    }

    #[test]
    fn test_callback_panic_rolls_back_and_unbinds() {
        TransactionRegistry::clear();
        let factory = Arc::new(FixedTransactionFactory::new());
        let template = template(TransactionAction::AlwaysBegin, &factory);

        let outcome = template.execute(test_event(), |_| panic!("callback exploded"));

        let exception = assert_failed_with(&outcome, "runtime.panic");
        assert!(matches!(
            exception.cause(),
            FlowError::CallbackPanicked(message) if message == "callback exploded"
        ));
        assert_rolled_back_once(&factory.last().unwrap());
        assert!(!TransactionRegistry::is_active());
    }

    #[test]
    fn test_commit_failure_attempts_rollback() {
        TransactionRegistry::clear();
        let factory = Arc::new(
            FixedTransactionFactory::new().with_resource(Arc::new(BrokenCommitResource)),
        );
        let template = template(TransactionAction::AlwaysBegin, &factory);

        let outcome =
            template.execute(test_event(), |event| Ok(event.with_variable("done", json!(1))));

        let exception = assert_failed_with(&outcome, "runtime.transaction");
        assert_eq!(exception.event().variable("done"), Some(&json!(1)));
        assert_rolled_back_once(&factory.last().unwrap());
        assert!(!TransactionRegistry::is_active());
    }

    #[test]
    fn test_begin_failure_reaches_handler() {
        TransactionRegistry::clear();
        let factory = Arc::new(FixedTransactionFactory::new());
        factory.fail_begin();
        let handler = Arc::new(RecordingExceptionHandler::propagating());
        let template = template(TransactionAction::AlwaysBegin, &factory)
            .with_exception_handler(handler.clone());

        let outcome = template.execute(test_event(), |_| panic!("callback must not run"));

        assert_failed_with(&outcome, "runtime.transaction");
        assert_eq!(handler.call_count(), 1);
        assert!(factory.created().is_empty());
    }

    #[test]
    fn test_external_transaction_is_joined_and_unbound() {
        TransactionRegistry::clear();
        let external = active_transaction().unwrap();
        let factory = Arc::new(FixedTransactionFactory::new().with_external(external.clone()));
        let template = ExecutionTemplate::new(
            TransactionConfig::new(TransactionAction::JoinIfPossible)
                .with_factory(factory.clone())
                .with_interact_with_external(true),
        );

        let outcome = template.execute(test_event(), |event| {
            assert_eq!(TransactionRegistry::current().unwrap().id(), external.id());
            Ok(event)
        });
        assert_success(&outcome);
        assert!(!TransactionRegistry::is_active());
        assert_unresolved(&external);

        template.execute(test_event(), fail_with(ErrorType::step()));
        assert!(external.is_rollback_only());
        assert_unresolved(&external);
        assert!(!TransactionRegistry::is_active());
    }

    #[test]
    fn test_pipeline_on_fail_fast_strategy_rolls_back_owned_transaction() {
        TransactionRegistry::clear();
        let recorder = ThreadRecorder::new();
        let pipeline = PipelineBuilder::new("orders")
            .step(RecordingStep::new("parse", ProcessingType::Light, &recorder))
            .step(RecordingStep::new("store", ProcessingType::Blocking, &recorder))
            .build()
            .unwrap();
        let strategy = ProcessingStrategy::new(
            StrategyConfig::new("direct", StrategyKind::Direct),
            small_pools().unwrap(),
        )
        .unwrap();
        let factory = Arc::new(FixedTransactionFactory::new());
        let handler = Arc::new(RecordingExceptionHandler::handling());
        let template = template(TransactionAction::AlwaysBegin, &factory)
            .with_exception_handler(handler.clone());

        let outcome = template.execute_pipeline(&strategy, &pipeline, test_event());

        assert_failed_with(&outcome, "runtime.transaction.usage");
        assert_eq!(handler.call_count(), 0);
        assert!(recorder.visits().is_empty());
        assert_rolled_back_once(&factory.last().unwrap());
    }

    #[test]
    fn test_pipeline_on_proactor_runs_inside_owned_transaction() {
        TransactionRegistry::clear();
        let recorder = ThreadRecorder::new();
        let pipeline = PipelineBuilder::new("orders")
            .step(RecordingStep::new("parse", ProcessingType::Light, &recorder))
            .step(RecordingStep::new("store", ProcessingType::Blocking, &recorder))
            .build()
            .unwrap();
        let strategy = ProcessingStrategy::new(
            StrategyConfig::new("proactor", StrategyKind::Proactor),
            small_pools().unwrap(),
        )
        .unwrap();
        let factory = Arc::new(FixedTransactionFactory::new());
        let template = template(TransactionAction::AlwaysBegin, &factory);

        let outcome = template.execute_pipeline(&strategy, &pipeline, test_event());

        assert_eq!(trail(assert_success(&outcome)), vec!["parse", "store"]);
        assert_eq!(recorder.distinct_threads().len(), 1);
        assert_committed_once(&factory.last().unwrap());
    }

    #[test]
    fn test_outcome_into_result_for_nested_calls() {
        TransactionRegistry::clear();
        let template = ExecutionTemplate::new(TransactionConfig::new(TransactionAction::None))
            .with_exception_handler(Arc::new(ContinueExceptionHandler));

        let outcome = template.execute(test_event(), fail_with(ErrorType::step()));
        assert!(matches!(outcome, Outcome::Handled(_)));
        assert!(outcome.into_result().is_ok());
    }
}
