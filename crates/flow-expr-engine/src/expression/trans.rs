//! 字段值转换链
//!
//! 字段项的 `trans` 形如 `toNumber().default(0)`，执行前先按字段路径取值并依次转换，
//! 结果写入数据源的 `<path>_<hash>` 键，生成的代码直接引用这个键。

use super::Expression;
use super::codegen::data_get;
use crate::value::ValueSource;
use regex::Regex;
use rule_engine_core::sandbox::ops::{self, Numeric};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use tracing::debug;

static TRANS_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\s*\(((?:'[^']*'|\x22[^\x22]*\x22|[^)])*)\)").unwrap());

static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[+-]?\d+").unwrap());

/// 转换结果在数据源中的键
pub fn trans_key(path: &str, trans: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(trans.as_bytes()));
    format!("{path}_{}", &digest[..32])
}

/// 解析转换链中的函数调用
pub fn parse_trans(trans: &str) -> Vec<(String, Vec<JsonValue>)> {
    TRANS_CALL
        .captures_iter(trans)
        .map(|caps| {
            let args = split_args(&caps[2])
                .into_iter()
                .filter(|arg| !arg.is_empty())
                .map(parse_arg)
                .collect();
            (caps[1].to_string(), args)
        })
        .collect()
}

/// 按逗号切分参数，引号内的逗号不切分
fn split_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, ',') => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());
    parts
}

fn parse_arg(arg: &str) -> JsonValue {
    let unquoted = arg
        .strip_prefix('\'')
        .and_then(|a| a.strip_suffix('\''))
        .or_else(|| arg.strip_prefix('"').and_then(|a| a.strip_suffix('"')));
    if let Some(s) = unquoted {
        return JsonValue::String(s.to_string());
    }
    match arg {
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        "null" => JsonValue::Null,
        _ => ops::as_numeric(&JsonValue::String(arg.to_string()))
            .map(Numeric::into_value)
            .unwrap_or_else(|| JsonValue::String(arg.to_string())),
    }
}

/// 依次执行转换链，未知函数忽略
pub fn apply(trans: &str, value: JsonValue) -> JsonValue {
    parse_trans(trans)
        .into_iter()
        .fold(value, |value, (function, args)| match function.as_str() {
            "toNumber" => to_number(&value),
            "toString" => to_string(&value),
            "toBoolean" => to_boolean(&value),
            "toArray" => to_array(value),
            "toJson" => JsonValue::String(value.to_string()),
            "trim" => map_str(value, |s| s.trim().to_string()),
            "upper" => map_str(value, |s| s.to_uppercase()),
            "lower" => map_str(value, |s| s.to_lowercase()),
            "default" => {
                if ops::is_absent(&value) || value == JsonValue::String(String::new()) {
                    args.into_iter().next().unwrap_or(JsonValue::Null)
                } else {
                    value
                }
            }
            _ => {
                debug!(function = %function, "未知的转换函数，已忽略");
                value
            }
        })
}

fn to_number(value: &JsonValue) -> JsonValue {
    if let Some(n) = ops::as_numeric(value) {
        return n.into_value();
    }
    match value {
        JsonValue::Bool(b) => JsonValue::from(i64::from(*b)),
        JsonValue::String(s) => LEADING_INT
            .find(s)
            .and_then(|m| m.as_str().trim().parse::<i64>().ok())
            .map(JsonValue::from)
            .unwrap_or(JsonValue::from(0)),
        _ => JsonValue::from(0),
    }
}

fn to_string(value: &JsonValue) -> JsonValue {
    match ops::to_string(value) {
        Ok(s) => JsonValue::String(s),
        Err(_) => JsonValue::String(value.to_string()),
    }
}

fn to_boolean(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) if s.eq_ignore_ascii_case("true") => JsonValue::Bool(true),
        JsonValue::String(s) if s.eq_ignore_ascii_case("false") => JsonValue::Bool(false),
        other => JsonValue::Bool(ops::truthy(other)),
    }
}

fn to_array(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Array(_) | JsonValue::Object(_) => value,
        JsonValue::Null => JsonValue::Array(Vec::new()),
        JsonValue::String(s) => match serde_json::from_str::<JsonValue>(&s) {
            Ok(decoded @ (JsonValue::Array(_) | JsonValue::Object(_))) => decoded,
            _ => JsonValue::Array(vec![JsonValue::String(s)]),
        },
        other => JsonValue::Array(vec![other]),
    }
}

fn map_str(value: JsonValue, f: impl Fn(&str) -> String) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(f(&s)),
        other => other,
    }
}

/// 把表达式（及其函数参数）中的转换结果写入数据源
///
/// 顶层表达式覆盖同名键，参数中的表达式只补充缺失的键。
pub fn bind_trans_values(expression: &Expression, data: &mut Map<String, JsonValue>, overwrite: bool) {
    for item in expression.items() {
        if let (Some(trans), Some(key)) = (item.trans(), item.trans_key()) {
            let source = JsonValue::Object(data.clone());
            let value = data_get(&source, &item.value_str())
                .cloned()
                .unwrap_or(JsonValue::Null);
            let value = apply(trans, value);
            if overwrite || !data.contains_key(&key) {
                data.insert(key, value);
            }
        }
        for arg in item.args().unwrap_or_default() {
            let nested = match arg.source() {
                ValueSource::Const(Some(e)) | ValueSource::Expression(Some(e)) => e,
                _ => continue,
            };
            bind_trans_values(nested, data, false);
        }
    }
}
