//! 值运算
//!
//! 沙箱内的值即 `serde_json::Value`。这里实现类型转换、宽松/严格比较与算术，
//! 语义与生成代码所面向的脚本语言保持一致：数字与数字字符串之间按数值比较，
//! 其余情况按字符串比较。

use crate::error::{Result, RuleError};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// 获取值的类型名称
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "array",
    }
}

/// 数值的两种内部表示
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Numeric::Int(i) => Value::from(i),
            Numeric::Float(f) => float_value(f),
        }
    }
}

/// 浮点数转为 JSON 值，NaN / Inf 无法表示时退化为 null
pub fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn number_to_numeric(n: &Number) -> Numeric {
    match n.as_i64() {
        Some(i) => Numeric::Int(i),
        None => Numeric::Float(n.as_f64().unwrap_or(0.0)),
    }
}

/// 解析数字字符串，允许前后空白
pub fn parse_numeric_str(s: &str) -> Option<Numeric> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    let bytes = trimmed.as_bytes();
    let mut i = 0;
    if matches!(bytes[0], b'+' | b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = i - digits_start;
    let mut frac_digits = 0;
    let mut is_float = false;
    if i < bytes.len() && bytes[i] == b'.' {
        is_float = true;
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        frac_digits = i - frac_start;
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        is_float = true;
        i += 1;
        if i < bytes.len() && matches!(bytes[i], b'+' | b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return None;
        }
    }
    if i != bytes.len() {
        return None;
    }
    if !is_float {
        if let Ok(v) = trimmed.parse::<i64>() {
            return Some(Numeric::Int(v));
        }
    }
    trimmed.parse::<f64>().ok().map(Numeric::Float)
}

/// 是否为数字或数字字符串
pub fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => parse_numeric_str(s).is_some(),
        _ => false,
    }
}

/// 严格数值视图：仅数字与数字字符串
pub fn as_numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Number(n) => Some(number_to_numeric(n)),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

/// 获取数值（用于算术与比较）
pub fn as_f64(value: &Value) -> Option<f64> {
    as_numeric(value).map(Numeric::as_f64)
}

/// 算术运算的操作数转换，非数字字符串与数组会报错
pub fn to_arithmetic(value: &Value, op: &str) -> Result<Numeric> {
    match value {
        Value::Null => Ok(Numeric::Int(0)),
        Value::Bool(b) => Ok(Numeric::Int(i64::from(*b))),
        Value::Number(n) => Ok(number_to_numeric(n)),
        Value::String(s) => parse_numeric_str(s).ok_or_else(|| {
            RuleError::ExecutionError(format!("不支持的操作数类型: string {op}，值 '{s}' 不是数字"))
        }),
        Value::Array(_) | Value::Object(_) => Err(RuleError::ExecutionError(format!(
            "不支持的操作数类型: array {op}"
        ))),
    }
}

/// 真值判定
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => match number_to_numeric(n) {
            Numeric::Int(i) => i != 0,
            Numeric::Float(f) => f != 0.0,
        },
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// 视为"不存在"的值：null 或空数组
pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// 标量转字符串，数组不可转换
pub fn to_string(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(true) => Ok("1".to_string()),
        Value::Bool(false) => Ok(String::new()),
        Value::Number(n) => Ok(number_to_string(n)),
        Value::String(s) => Ok(s.clone()),
        Value::Array(_) | Value::Object(_) => Err(RuleError::ExecutionError(
            "数组无法转换为字符串".to_string(),
        )),
    }
}

pub fn number_to_string(n: &Number) -> String {
    match number_to_numeric(n) {
        Numeric::Int(i) => i.to_string(),
        Numeric::Float(f) => f.to_string(),
    }
}

/// 宽松相等 `==`
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(b), other) | (other, Value::Bool(b)) => *b == truthy(other),
        (Value::Null, other) | (other, Value::Null) => !truthy(other) && !is_nonempty_string(other),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| loose_eq(v, other)))
        }
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => loose_cmp(left, right) == Some(Ordering::Equal),
    }
}

fn is_nonempty_string(value: &Value) -> bool {
    // null 与字符串按 "" 比较
    matches!(value, Value::String(s) if !s.is_empty())
}

/// 宽松比较，返回 None 表示不可比较
pub fn loose_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Bool(_), _) | (_, Value::Bool(_)) | (Value::Null, _) | (_, Value::Null) => {
            Some(truthy(left).cmp(&truthy(right)))
        }
        (Value::Array(a), Value::Array(b)) => Some(a.len().cmp(&b.len())),
        (Value::Array(_) | Value::Object(_), _) => Some(Ordering::Greater),
        (_, Value::Array(_) | Value::Object(_)) => Some(Ordering::Less),
        _ => {
            if let (Some(l), Some(r)) = (as_numeric(left), as_numeric(right)) {
                return compare_numeric(l, r);
            }
            let l = to_string(left).ok()?;
            let r = to_string(right).ok()?;
            Some(l.cmp(&r))
        }
    }
}

fn compare_numeric(left: Numeric, right: Numeric) -> Option<Ordering> {
    match (left, right) {
        (Numeric::Int(a), Numeric::Int(b)) => Some(a.cmp(&b)),
        (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

/// 严格相等 `===`
pub fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            match (number_to_numeric(a), number_to_numeric(b)) {
                (Numeric::Int(x), Numeric::Int(y)) => x == y,
                (Numeric::Float(x), Numeric::Float(y)) => x == y,
                _ => false,
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| strict_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && strict_eq(va, vb))
        }
        _ => left == right,
    }
}

/// 四则运算
pub fn arithmetic(op: char, left: &Value, right: &Value) -> Result<Value> {
    let symbol = op.to_string();
    let l = to_arithmetic(left, &symbol)?;
    let r = to_arithmetic(right, &symbol)?;

    let result = match (op, l, r) {
        ('+', Numeric::Int(a), Numeric::Int(b)) => a
            .checked_add(b)
            .map(Numeric::Int)
            .unwrap_or(Numeric::Float(a as f64 + b as f64)),
        ('-', Numeric::Int(a), Numeric::Int(b)) => a
            .checked_sub(b)
            .map(Numeric::Int)
            .unwrap_or(Numeric::Float(a as f64 - b as f64)),
        ('*', Numeric::Int(a), Numeric::Int(b)) => a
            .checked_mul(b)
            .map(Numeric::Int)
            .unwrap_or(Numeric::Float(a as f64 * b as f64)),
        ('/', _, r) if r.as_f64() == 0.0 => {
            return Err(RuleError::ExecutionError("除数不能为 0".to_string()));
        }
        ('/', Numeric::Int(a), Numeric::Int(b)) if a.checked_rem(b) == Some(0) => a
            .checked_div(b)
            .map(Numeric::Int)
            .unwrap_or(Numeric::Float(a as f64 / b as f64)),
        ('%', l, r) => {
            let (a, b) = (l.as_f64() as i64, r.as_f64() as i64);
            if b == 0 {
                return Err(RuleError::ExecutionError("取模除数不能为 0".to_string()));
            }
            // i64::MIN % -1 溢出，数学结果为 0
            Numeric::Int(a.checked_rem(b).unwrap_or(0))
        }
        ('+', a, b) => Numeric::Float(a.as_f64() + b.as_f64()),
        ('-', a, b) => Numeric::Float(a.as_f64() - b.as_f64()),
        ('*', a, b) => Numeric::Float(a.as_f64() * b.as_f64()),
        ('/', a, b) => Numeric::Float(a.as_f64() / b.as_f64()),
        _ => {
            return Err(RuleError::ExecutionError(format!("未知的算术运算符 {op}")));
        }
    };
    Ok(result.into_value())
}

/// 下标访问，缺失返回 null
pub fn index(target: &Value, key: &Value) -> Value {
    match target {
        Value::Array(items) => key_as_index(key)
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null),
        Value::Object(map) => key_as_string(key)
            .and_then(|k| map.get(&k))
            .cloned()
            .unwrap_or(Value::Null),
        Value::String(s) => key_as_index(key)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn key_as_index(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) => n.as_u64().map(|v| v as usize),
        Value::String(s) => s.parse::<usize>().ok(),
        Value::Bool(b) => Some(usize::from(*b)),
        _ => None,
    }
}

/// 数组键统一转为字符串
pub fn key_as_string(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_to_string(n)),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}
