//! Benchmarks for change propagation and pipe chains.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tie::{Engine, Pipe, PipeFn, TieSpec, Value};

/// `depth` ties, each depending on the previous one.
fn dependency_chain(depth: usize) -> Engine {
    let mut engine = Engine::new();
    engine
        .register_tie(TieSpec::new("t0", Value::from(json!({"n": 0}))))
        .expect("root tie");
    for i in 1..depth {
        engine
            .register_tie(
                TieSpec::new(format!("t{i}"), Value::from(json!({"level": i})))
                    .with_dependencies([format!("t{}", i - 1)]),
            )
            .expect("dependent tie");
    }
    engine
}

/// Benchmark one write fanning out to `n` dependents of the same tie
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("set", n), &n, |b, &n| {
            let mut engine = Engine::new();
            engine
                .register_tie(TieSpec::new("source", Value::from(json!({"n": 0}))))
                .expect("source tie");
            for i in 0..n {
                engine
                    .register_tie(
                        TieSpec::new(format!("d{i}"), Value::from(json!({})))
                            .with_dependencies(["source"]),
                    )
                    .expect("dependent tie");
            }
            let mut counter = 0;
            b.iter(|| {
                counter += 1;
                engine.set("source", "n", counter).expect("set");
            });
        });
    }

    group.finish();
}

/// Benchmark a write travelling down a dependency chain
fn bench_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("depth");

    for depth in [10, 100] {
        group.bench_with_input(BenchmarkId::new("set", depth), &depth, |b, &depth| {
            let mut engine = dependency_chain(depth);
            let mut counter = 0;
            b.iter(|| {
                counter += 1;
                engine.set("t0", "n", counter).expect("set");
            });
        });
    }

    group.finish();
}

/// Benchmark synchronous chains and parsed expressions
fn bench_chains(c: &mut Criterion) {
    let mut engine = Engine::new();
    engine
        .register_tie(TieSpec::new("user", Value::from(json!({"name": "ann"}))))
        .expect("user tie");
    engine
        .register_pipe(Pipe::new(
            "uppercase",
            PipeFn::sync(|call| Ok(Value::from(call.value.to_string().to_uppercase()))),
        ))
        .expect("pipe");

    c.bench_function("chain/sync", |b| {
        b.iter(|| {
            engine
                .view("user")
                .and_then(|chain| chain.pipe("property", [Value::from("name")]))
                .and_then(|chain| chain.pipe("uppercase", []))
                .map(|chain| chain.value())
        })
    });

    c.bench_function("chain/expression", |b| {
        b.iter(|| {
            engine
                .evaluate("user.name|uppercase|default:'none'", None)
                .map(|chain| chain.value())
        })
    });
}

criterion_group!(benches, bench_fan_out, bench_depth, bench_chains);
criterion_main!(benches);
