//! Benchmarks for pipeline dispatch.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowexec::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn pipeline() -> Pipeline {
    PipelineBuilder::new("bench")
        .step(FnStep::new("parse", ProcessingType::Light, Ok))
        .step(FnStep::new("store", ProcessingType::Blocking, Ok))
        .step(FnStep::new("score", ProcessingType::Intensive, Ok))
        .build()
        .unwrap()
}

fn strategy_benchmark(c: &mut Criterion) {
    let pools = Arc::new(SchedulerPools::new(&PoolsConfig::default()).unwrap());
    let pipeline = pipeline();

    for kind in [
        StrategyKind::Direct,
        StrategyKind::WorkQueue,
        StrategyKind::Proactor,
        StrategyKind::StreamReactor,
    ] {
        let config = StrategyConfig::new(format!("bench-{kind}"), kind);
        let strategy = ProcessingStrategy::new(config, pools.clone()).unwrap();
        c.bench_function(&format!("process/{kind}"), |b| {
            b.iter(|| black_box(strategy.process(&pipeline, Event::new(json!(1)))).is_ok());
        });
    }
}

fn template_benchmark(c: &mut Criterion) {
    let factory: Arc<dyn TransactionFactory> = Arc::new(LocalTransactionFactory::new());
    let template = ExecutionTemplate::new(
        TransactionConfig::new(TransactionAction::AlwaysBegin).with_factory(factory),
    );

    c.bench_function("execute/always-begin", |b| {
        b.iter(|| black_box(template.execute(Event::new(json!(1)), Ok)).is_success());
    });
}

criterion_group!(benches, strategy_benchmark, template_benchmark);
criterion_main!(benches);
