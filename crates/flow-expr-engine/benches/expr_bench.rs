//! 表达式引擎基准测试
//!
//! 测试覆盖：
//! - 条件结构的构建与代码生成
//! - 条件执行（含执行集缓存命中）
//! - 不同字段数量下的表单取值

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use flow_expr_engine::{ConditionBuilder, EngineContext, FormBuilder};
use serde_json::{Map, Value as JsonValue, json};
use std::hint::black_box;

fn condition_input() -> JsonValue {
    json!({
        "ops": "AND",
        "children": [
            {
                "type": "compare",
                "left_operands": {
                    "type": "expression",
                    "const_value": null,
                    "expression_value": [{"type": "fields", "value": "order.amount", "name": "", "args": null}]
                },
                "condition": "gte",
                "right_operands": {
                    "type": "const",
                    "const_value": [{"type": "input", "value": "100", "name": "", "args": null}],
                    "expression_value": null
                }
            },
            {
                "ops": "OR",
                "children": [
                    {
                        "type": "compare",
                        "left_operands": {
                            "type": "expression",
                            "const_value": null,
                            "expression_value": [{"type": "fields", "value": "user.level", "name": "", "args": null}]
                        },
                        "condition": "equals",
                        "right_operands": {
                            "type": "const",
                            "const_value": [{"type": "input", "value": "vip", "name": "", "args": null}],
                            "expression_value": null
                        }
                    },
                    {
                        "type": "compare",
                        "left_operands": {
                            "type": "expression",
                            "const_value": null,
                            "expression_value": [{"type": "fields", "value": "user.tags", "name": "", "args": null}]
                        },
                        "condition": "not_empty"
                    }
                ]
            }
        ]
    })
}

/// 生成 n 个数字字段的表单结构
fn form_input(n: usize) -> JsonValue {
    let properties: Map<String, JsonValue> = (0..n)
        .map(|i| {
            (
                format!("field_{i}"),
                json!({
                    "type": "number",
                    "sort": i,
                    "value": {
                        "type": "const",
                        "const_value": [{"type": "input", "value": i.to_string(), "name": "", "args": null}],
                        "expression_value": null
                    }
                }),
            )
        })
        .collect();
    json!({"type": "object", "properties": properties})
}

fn bench_condition(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition");
    let raw = condition_input();
    let builder = ConditionBuilder::new();

    group.bench_function("build", |b| {
        b.iter(|| black_box(builder.build(black_box(&raw))));
    });

    let condition = builder
        .build(&raw)
        .ok()
        .flatten()
        .expect("condition input is valid");
    group.bench_function("code", |b| {
        b.iter(|| black_box(condition.code()));
    });

    let ctx = EngineContext::default();
    let source = json!({"order": {"amount": 150}, "user": {"level": "normal", "tags": ["new"]}});
    group.bench_function("result", |b| {
        b.iter(|| black_box(condition.result(&ctx, black_box(&source))));
    });

    group.finish();
}

fn bench_form_key_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("form_key_value");
    let ctx = EngineContext::default();

    for size in [5usize, 20, 50] {
        let form = FormBuilder::new()
            .build(&form_input(size))
            .ok()
            .flatten()
            .expect("form input is valid");
        group.bench_with_input(BenchmarkId::from_parameter(size), &form, |b, form| {
            b.iter(|| black_box(form.key_value(&ctx, &json!({}), true, "bench", true)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_condition, bench_form_key_value);
criterion_main!(benches);
