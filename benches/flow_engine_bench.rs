//! 端到端性能基准测试
//!
//! 测试覆盖：
//! - 组件从原始 JSON 构建到条件求值的完整链路
//! - 不同条件数量下的条件执行性能曲线
//! - 执行器缓存命中与每次新建执行器的开销对比

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use flow_expr_engine::{Component, ConditionBuilder, EngineContext};
use serde_json::{Map, Value, json};
use std::hint::black_box;

/// 由 n 个相等比较组成的 AND 条件
fn and_condition(n: usize) -> Value {
    let children: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "type": "compare",
                "left_operands": {
                    "type": "expression",
                    "const_value": null,
                    "expression_value": [{"type": "fields", "value": format!("field_{i}"), "name": "", "args": null}]
                },
                "condition": "equals",
                "right_operands": {
                    "type": "const",
                    "const_value": [{"type": "input", "value": format!("value_{i}"), "name": "", "args": null}],
                    "expression_value": null
                }
            })
        })
        .collect();
    json!({"ops": "AND", "children": children})
}

fn chain_source(n: usize) -> Value {
    let data: Map<String, Value> = (0..n)
        .map(|i| (format!("field_{i}"), json!(format!("value_{i}"))))
        .collect();
    Value::Object(data)
}

fn bench_component_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("component_pipeline");
    let raw = json!({"id": "component-bench", "type": "condition", "structure": and_condition(3)});
    let source = chain_source(3);
    let ctx = EngineContext::default();

    group.bench_function("fast_create_and_result", |b| {
        b.iter(|| {
            let Ok(Some(mut component)) = Component::fast_create(black_box(&raw)) else {
                return;
            };
            if let Ok(condition) = component.condition() {
                black_box(condition.result(&ctx, &source)).ok();
            }
        });
    });

    group.finish();
}

fn bench_condition_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition_size");
    let ctx = EngineContext::default();

    for size in [1usize, 5, 10, 25] {
        let Ok(Some(condition)) = ConditionBuilder::new().build(&and_condition(size)) else {
            continue;
        };
        let source = chain_source(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &condition, |b, condition| {
            b.iter(|| black_box(condition.result(&ctx, black_box(&source))));
        });
    }

    group.finish();
}

fn bench_runner_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("runner_cache");
    let Ok(Some(condition)) = ConditionBuilder::new().build(&and_condition(5)) else {
        return;
    };
    let source = chain_source(5);

    let shared = EngineContext::default();
    group.bench_function("shared_context", |b| {
        b.iter(|| black_box(condition.result(&shared, &source)));
    });

    group.bench_function("fresh_context", |b| {
        b.iter(|| {
            let ctx = EngineContext::default();
            black_box(condition.result(&ctx, &source))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_component_pipeline,
    bench_condition_size,
    bench_runner_cache
);
criterion_main!(benches);
