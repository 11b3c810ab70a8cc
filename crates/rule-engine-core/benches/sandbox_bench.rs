//! 沙箱性能基准测试
//!
//! 测试覆盖：
//! - 表达式编译性能
//! - 已编译表达式的执行性能
//! - 不同条件数量下的执行性能曲线
//! - 完整会话（创建、执行、释放）开销

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rule_engine_core::sandbox::EmptyScope;
use rule_engine_core::{
    RuleExecutionSetProperties, RuleServiceProvider, RuleSessionType, RuleType, Sandbox,
    SandboxRuleServiceProvider,
};
use serde_json::{Map, Value, json};
use std::hint::black_box;

const CONDITION_CODE: &str =
    "((('哈哈哈') > (2)) && (($data['success']) || ((2) === ('2'))))";

/// 生成由 n 个比较组成的 AND 表达式
fn and_chain(n: usize) -> String {
    (0..n)
        .map(|i| format!("(($data['field_{i}']) == ('value_{i}'))"))
        .collect::<Vec<_>>()
        .join(" && ")
}

fn chain_inputs(n: usize) -> Map<String, Value> {
    let data: Map<String, Value> = (0..n)
        .map(|i| (format!("field_{i}"), json!(format!("value_{i}"))))
        .collect();
    let mut inputs = Map::new();
    inputs.insert("data".to_string(), Value::Object(data));
    inputs
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let sandbox = Sandbox::default();

    group.bench_function("condition", |b| {
        b.iter(|| {
            let program = sandbox.compile_expression(black_box(CONDITION_CODE), &EmptyScope);
            black_box(program)
        });
    });

    let script = "$total = $a + $b; if ($total > 10) { return 'big'; } else { return 'small'; }";
    group.bench_function("script", |b| {
        b.iter(|| black_box(sandbox.compile_script(black_box(script), &EmptyScope)));
    });

    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let sandbox = Sandbox::default();
    let program = sandbox
        .compile_expression(CONDITION_CODE, &EmptyScope)
        .unwrap();
    let mut inputs = Map::new();
    inputs.insert("data".to_string(), json!({"success": true}));

    c.bench_function("execute_condition", |b| {
        b.iter(|| black_box(sandbox.execute(&program, black_box(&inputs), &EmptyScope)));
    });
}

fn bench_and_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("and_chain");
    let sandbox = Sandbox::default();

    for count in [2, 5, 10, 20, 50].iter() {
        let program = sandbox
            .compile_expression(&and_chain(*count), &EmptyScope)
            .unwrap();
        let inputs = chain_inputs(*count);

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| black_box(sandbox.execute(&program, &inputs, &EmptyScope)));
        });
    }

    group.finish();
}

fn bench_session(c: &mut Criterion) {
    let provider = SandboxRuleServiceProvider::default();
    let admin = provider.rule_administrator();
    let set = admin
        .execution_set_provider()
        .create_rule_execution_set(
            vec!["$a + $b".to_string(), "$a * $b".to_string()],
            RuleExecutionSetProperties::new().with_rule_type(RuleType::Expression),
        )
        .unwrap();
    admin.register_rule_execution_set("bench", set).unwrap();

    let properties = RuleExecutionSetProperties::new();
    let mut inputs = Map::new();
    inputs.insert("a".to_string(), json!(3));
    inputs.insert("b".to_string(), json!(4));

    c.bench_function("session_round_trip", |b| {
        b.iter(|| {
            let session = provider
                .rule_runtime()
                .create_rule_session("bench", &properties, RuleSessionType::Stateless)
                .unwrap();
            let result = session.execute_rules(black_box(&inputs));
            session.release();
            black_box(result)
        });
    });
}

criterion_group!(
    benches,
    bench_compile,
    bench_execute,
    bench_and_chain,
    bench_session
);
criterion_main!(benches);
