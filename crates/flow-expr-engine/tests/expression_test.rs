//! 表达式集成测试：构建、生成代码并在沙箱中执行

use flow_expr_engine::{EngineContext, Expression, ExpressionBuilder};
use serde_json::{Value as JsonValue, json};

fn product_input() -> JsonValue {
    json!([
        {"type": "fields", "value": "product_qty[0]", "name": "商品数量", "args": null},
        {"type": "input", "value": "*23+", "name": "*23+", "args": null},
        {
            "type": "methods",
            "value": "round",
            "name": "四舍五入",
            "args": [
                {
                    "type": "const",
                    "const_value": [{"type": "input", "value": "23.666555", "name": "name", "args": null}],
                    "expression_value": null
                },
                {
                    "type": "const",
                    "const_value": [{"type": "input", "value": "2", "name": "name", "args": null}],
                    "expression_value": null
                }
            ]
        }
    ])
}

fn method(name: &str, args: &[&str]) -> JsonValue {
    let args: Vec<_> = args
        .iter()
        .map(|arg| {
            json!({
                "type": "const",
                "const_value": [{"type": "input", "value": arg, "name": "name", "args": []}],
                "expression_value": null
            })
        })
        .collect();
    json!([{"type": "methods", "value": name, "name": name, "args": args}])
}

fn build(raw: &JsonValue) -> Expression {
    ExpressionBuilder::new().build(raw).expect("表达式不能为空")
}

fn run(expression: &Expression, source: JsonValue) -> JsonValue {
    let ctx = EngineContext::default();
    expression
        .result(&ctx, &source, true)
        .unwrap()
        .unwrap_or(JsonValue::Null)
}

#[test]
fn test_build_round_trip() {
    let input = product_input();
    assert_eq!(build(&input).to_json(), input);

    let quoted = json!([{
        "type": "methods",
        "value": "strlen",
        "name": "strlen",
        "args": [{
            "type": "const",
            "const_value": [{"type": "input", "value": "'123'", "name": "name", "args": null}],
            "expression_value": null
        }]
    }]);
    assert_eq!(build(&quoted).to_json(), quoted);
}

#[test]
fn test_code() {
    let expression = build(&product_input());
    assert_eq!(
        expression.code(false),
        "$data['product_qty'][0]*23+round((23.666555),(2))"
    );
    assert_eq!(
        expression.code(true),
        "($data['product_qty'][0]*23+round((23.666555),(2)))"
    );
}

#[test]
fn test_runner() {
    let expression = build(&product_input());
    let first = run(&expression, json!({"product_qty": [1]}));
    assert!((first.as_f64().unwrap() - 46.67).abs() < 1e-9);
    let second = run(&expression, json!({"product_qty": [2]}));
    assert!((second.as_f64().unwrap() - 69.67).abs() < 1e-9);
}

#[test]
fn test_not_executed() {
    let ctx = EngineContext::default();
    let expression = build(&product_input());
    assert!(expression.result(&ctx, &json!({}), false).unwrap().is_none());
}

#[test]
fn test_string_template() {
    let mut expression = build(&json!([
        {"type": "input", "value": "你是一个有用的助手，能解决", "name": ""},
        {"type": "fields", "value": "9527.language", "name": ""},
        {"type": "input", "value": "的问题，并且能够同时帮助", "name": ""},
        {"type": "fields", "value": "9527.num", "name": ""},
        {"type": "input", "value": "个人。\"嘻嘻\"", "name": ""}
    ]));
    expression.set_string_template(true);
    let result = run(&expression, json!({"9527": {"language": "PHP", "num": 9527}}));
    assert_eq!(
        result,
        json!("你是一个有用的助手，能解决PHP的问题，并且能够同时帮助9527个人。\"嘻嘻\"")
    );
}

#[test]
fn test_methods() {
    assert_eq!(run(&build(&method("round", &["26.446555", "2"])), json!({})), json!(26.45));
    assert_eq!(
        run(&build(&method("str_contains", &["hello world", "hello"])), json!({})),
        json!(true)
    );
    assert!(run(&build(&method("mt_rand", &["1", "10"])), json!({})).is_i64());
    assert!(run(&build(&method("time", &[])), json!({})).is_i64());
    assert!(run(&build(&method("uniqid", &[])), json!({})).is_string());
    assert_eq!(
        run(&build(&method("get_iso8601_date", &[])), json!({}))
            .as_str()
            .map(str::len),
        Some("2024-01-01".len())
    );
}

#[test]
fn test_method_with_field_argument() {
    let expression = build(&json!([{
        "type": "methods",
        "value": "strtoupper",
        "name": "strtoupper",
        "args": [{
            "type": "expression",
            "const_value": null,
            "expression_value": [{"type": "fields", "value": "a.b", "name": "name", "args": []}]
        }]
    }]));
    assert_eq!(expression.code(false), "strtoupper(($data['a']['b']))");
    assert_eq!(run(&expression, json!({"a": {"b": "flow"}})), json!("FLOW"));
    assert_eq!(expression.all_field_items().len(), 1);
}

#[test]
fn test_unknown_function_rejected() {
    let ctx = EngineContext::default();
    let expression = build(&method("system", &["ls"]));
    assert!(expression.result(&ctx, &json!({}), true).is_err());
}

#[test]
fn test_trans_field() {
    let expression = build(&json!([
        {"type": "fields", "value": "a.b", "name": "", "args": null, "trans": "toNumber()"},
        {"type": "input", "value": "+1", "name": "", "args": null}
    ]));
    assert!(expression.code(false).starts_with("$data['a.b_"));
    assert_eq!(run(&expression, json!({"a": {"b": "41"}})), json!(42));
}
