//! 内置函数白名单
//!
//! 规则源码中只能调用这里登记的函数或通过执行代码注册表注册的宿主函数。
//! 函数名大小写不敏感。

use super::ops::{self, Numeric, as_numeric, float_value, to_arithmetic, to_string, truthy};
use crate::error::{Result, RuleError};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Local, TimeZone};
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::LazyLock;

pub type Builtin = fn(&[Value]) -> Result<Value>;

static BUILTINS: LazyLock<HashMap<&'static str, Builtin>> = LazyLock::new(|| {
    let entries: [(&'static str, Builtin); 43] = [
        // 数学
        ("round", round),
        ("abs", abs),
        ("ceil", ceil),
        ("floor", floor),
        ("max", max),
        ("min", min),
        ("intval", intval),
        ("floatval", floatval),
        ("strval", strval),
        ("boolval", boolval),
        ("is_numeric", is_numeric),
        // 字符串
        ("strlen", strlen),
        ("mb_strlen", mb_strlen),
        ("trim", trim),
        ("strtoupper", strtoupper),
        ("strtolower", strtolower),
        ("substr", substr),
        ("str_contains", str_contains),
        ("str_starts_with", str_starts_with),
        ("str_ends_with", str_ends_with),
        ("str_replace", str_replace),
        ("implode", implode),
        ("explode", explode),
        // 数组
        ("count", count),
        ("in_array", in_array),
        ("array_keys", array_keys),
        ("array_values", array_values),
        ("json_encode", json_encode),
        ("json_decode", json_decode),
        // 存在性
        ("isset", isset),
        ("empty", empty),
        // 时间
        ("time", time),
        ("date", date),
        ("get_iso8601_date", get_iso8601_date),
        ("get_iso8601_date_time", get_iso8601_date_time),
        ("get_iso8601_date_time_with_offset", get_iso8601_date_time_with_offset),
        ("get_rfc1123_date_time", get_rfc1123_date_time),
        // 杂项
        ("uniqid", uniqid),
        ("mt_rand", mt_rand),
        ("sha256", sha256),
        ("base64_encode", base64_encode),
        ("base64_decode", base64_decode),
        ("is_array", is_array),
    ];
    entries.into_iter().collect()
});

/// 查找内置函数
pub fn lookup(name: &str) -> Option<Builtin> {
    BUILTINS.get(name.to_ascii_lowercase().as_str()).copied()
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

fn arg<'a>(args: &'a [Value], i: usize, function: &str) -> Result<&'a Value> {
    args.get(i).ok_or_else(|| {
        RuleError::ExecutionError(format!("{function}() 缺少第 {} 个参数", i + 1))
    })
}

fn opt_arg(args: &[Value], i: usize) -> Option<&Value> {
    args.get(i)
}

fn str_arg(args: &[Value], i: usize, function: &str) -> Result<String> {
    to_string(arg(args, i, function)?)
}

fn int_arg(args: &[Value], i: usize, function: &str) -> Result<i64> {
    match to_arithmetic(arg(args, i, function)?, function)? {
        Numeric::Int(v) => Ok(v),
        Numeric::Float(f) => Ok(f as i64),
    }
}

// ==================== 数学 ====================

fn round(args: &[Value]) -> Result<Value> {
    let value = to_arithmetic(arg(args, 0, "round")?, "round")?.as_f64();
    let precision = match opt_arg(args, 1) {
        Some(p) => int_arg(std::slice::from_ref(p), 0, "round")?,
        None => 0,
    };
    let factor = 10f64.powi(precision.clamp(-308, 308) as i32);
    let scaled = value * factor;
    // 精度超出浮点范围时已无可舍入的位数
    if !scaled.is_finite() {
        return Ok(float_value(value));
    }
    // 远离零方向舍入
    Ok(float_value(scaled.round() / factor))
}

fn abs(args: &[Value]) -> Result<Value> {
    Ok(match to_arithmetic(arg(args, 0, "abs")?, "abs")? {
        Numeric::Int(i) => i
            .checked_abs()
            .map(Value::from)
            .unwrap_or_else(|| float_value((i as f64).abs())),
        Numeric::Float(f) => float_value(f.abs()),
    })
}

fn ceil(args: &[Value]) -> Result<Value> {
    let v = to_arithmetic(arg(args, 0, "ceil")?, "ceil")?.as_f64();
    Ok(float_value(v.ceil()))
}

fn floor(args: &[Value]) -> Result<Value> {
    let v = to_arithmetic(arg(args, 0, "floor")?, "floor")?.as_f64();
    Ok(float_value(v.floor()))
}

fn extremum(args: &[Value], function: &str, pick_greater: bool) -> Result<Value> {
    let candidates: Vec<Value> = match args {
        [Value::Array(items)] => items.clone(),
        _ => args.to_vec(),
    };
    let mut iter = candidates.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| RuleError::ExecutionError(format!("{function}() 至少需要一个参数")))?;
    for candidate in iter {
        let ordering = ops::loose_cmp(&candidate, &best);
        let replace = match ordering {
            Some(std::cmp::Ordering::Greater) => pick_greater,
            Some(std::cmp::Ordering::Less) => !pick_greater,
            _ => false,
        };
        if replace {
            best = candidate;
        }
    }
    Ok(best)
}

fn max(args: &[Value]) -> Result<Value> {
    extremum(args, "max", true)
}

fn min(args: &[Value]) -> Result<Value> {
    extremum(args, "min", false)
}

fn intval(args: &[Value]) -> Result<Value> {
    let value = arg(args, 0, "intval")?;
    Ok(Value::from(match value {
        Value::String(s) => leading_int(s),
        Value::Array(a) => i64::from(!a.is_empty()),
        Value::Object(o) => i64::from(!o.is_empty()),
        other => match to_arithmetic(other, "intval")? {
            Numeric::Int(i) => i,
            Numeric::Float(f) => f as i64,
        },
    }))
}

/// 取字符串开头的整数部分，无数字前缀时为 0
pub fn leading_int(s: &str) -> i64 {
    let trimmed = s.trim_start();
    if let Some(Numeric::Float(f)) = ops::parse_numeric_str(trimmed) {
        return f as i64;
    }
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        if c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse::<i64>().unwrap_or(0)
}

fn floatval(args: &[Value]) -> Result<Value> {
    let value = arg(args, 0, "floatval")?;
    let f = match as_numeric(value) {
        Some(n) => n.as_f64(),
        None => match value {
            Value::String(s) => leading_int(s) as f64,
            other => f64::from(u8::from(truthy(other))),
        },
    };
    Ok(float_value(f))
}

fn strval(args: &[Value]) -> Result<Value> {
    Ok(Value::String(str_arg(args, 0, "strval")?))
}

fn boolval(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(truthy(arg(args, 0, "boolval")?)))
}

fn is_numeric(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(ops::is_numeric(arg(args, 0, "is_numeric")?)))
}

fn is_array(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(matches!(
        arg(args, 0, "is_array")?,
        Value::Array(_) | Value::Object(_)
    )))
}

// ==================== 字符串 ====================

fn strlen(args: &[Value]) -> Result<Value> {
    Ok(Value::from(str_arg(args, 0, "strlen")?.len()))
}

fn mb_strlen(args: &[Value]) -> Result<Value> {
    Ok(Value::from(str_arg(args, 0, "mb_strlen")?.chars().count()))
}

fn trim(args: &[Value]) -> Result<Value> {
    Ok(Value::String(str_arg(args, 0, "trim")?.trim().to_string()))
}

fn strtoupper(args: &[Value]) -> Result<Value> {
    Ok(Value::String(str_arg(args, 0, "strtoupper")?.to_uppercase()))
}

fn strtolower(args: &[Value]) -> Result<Value> {
    Ok(Value::String(str_arg(args, 0, "strtolower")?.to_lowercase()))
}

fn substr(args: &[Value]) -> Result<Value> {
    let chars: Vec<char> = str_arg(args, 0, "substr")?.chars().collect();
    let len = chars.len() as i64;
    let start = match int_arg(args, 1, "substr")? {
        s if s < 0 => len.saturating_add(s).max(0),
        s => s.min(len),
    };
    let end = match opt_arg(args, 2) {
        Some(Value::Null) | None => len,
        Some(_) => match int_arg(args, 2, "substr")? {
            l if l < 0 => len.saturating_add(l).max(start),
            l => start.saturating_add(l).min(len),
        },
    };
    // 0 <= start <= end <= len
    Ok(Value::String(
        chars[start as usize..end as usize].iter().collect(),
    ))
}

fn str_contains(args: &[Value]) -> Result<Value> {
    let haystack = str_arg(args, 0, "str_contains")?;
    let needle = str_arg(args, 1, "str_contains")?;
    Ok(Value::Bool(haystack.contains(&needle)))
}

fn str_starts_with(args: &[Value]) -> Result<Value> {
    let haystack = str_arg(args, 0, "str_starts_with")?;
    let needle = str_arg(args, 1, "str_starts_with")?;
    Ok(Value::Bool(haystack.starts_with(&needle)))
}

fn str_ends_with(args: &[Value]) -> Result<Value> {
    let haystack = str_arg(args, 0, "str_ends_with")?;
    let needle = str_arg(args, 1, "str_ends_with")?;
    Ok(Value::Bool(haystack.ends_with(&needle)))
}

fn str_replace(args: &[Value]) -> Result<Value> {
    let search = str_arg(args, 0, "str_replace")?;
    let replace = str_arg(args, 1, "str_replace")?;
    let subject = str_arg(args, 2, "str_replace")?;
    if search.is_empty() {
        return Ok(Value::String(subject));
    }
    Ok(Value::String(subject.replace(&search, &replace)))
}

fn implode(args: &[Value]) -> Result<Value> {
    let (separator, pieces) = match (arg(args, 0, "implode")?, opt_arg(args, 1)) {
        (Value::Array(items), None) => (String::new(), items.clone()),
        (sep, Some(Value::Array(items))) => (to_string(sep)?, items.clone()),
        (sep, Some(Value::Object(map))) => (to_string(sep)?, map.values().cloned().collect()),
        _ => {
            return Err(RuleError::ExecutionError(
                "implode() 参数必须为数组".to_string(),
            ));
        }
    };
    let parts = pieces.iter().map(to_string).collect::<Result<Vec<_>>>()?;
    Ok(Value::String(parts.join(&separator)))
}

fn explode(args: &[Value]) -> Result<Value> {
    let separator = str_arg(args, 0, "explode")?;
    let subject = str_arg(args, 1, "explode")?;
    if separator.is_empty() {
        return Err(RuleError::ExecutionError(
            "explode() 分隔符不能为空".to_string(),
        ));
    }
    Ok(Value::Array(
        subject
            .split(separator.as_str())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    ))
}

// ==================== 数组 ====================

fn count(args: &[Value]) -> Result<Value> {
    match arg(args, 0, "count")? {
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::Object(map) => Ok(Value::from(map.len())),
        other => Err(RuleError::ExecutionError(format!(
            "count() 参数必须为数组，实际为 {}",
            ops::type_name(other)
        ))),
    }
}

fn in_array(args: &[Value]) -> Result<Value> {
    let needle = arg(args, 0, "in_array")?;
    let strict = opt_arg(args, 2).is_some_and(truthy);
    let matches = |item: &Value| {
        if strict {
            ops::strict_eq(item, needle)
        } else {
            ops::loose_eq(item, needle)
        }
    };
    let found = match arg(args, 1, "in_array")? {
        Value::Array(items) => items.iter().any(matches),
        Value::Object(map) => map.values().any(matches),
        _ => false,
    };
    Ok(Value::Bool(found))
}

fn array_keys(args: &[Value]) -> Result<Value> {
    match arg(args, 0, "array_keys")? {
        Value::Array(items) => Ok(Value::Array((0..items.len()).map(Value::from).collect())),
        Value::Object(map) => Ok(Value::Array(
            map.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        _ => Err(RuleError::ExecutionError(
            "array_keys() 参数必须为数组".to_string(),
        )),
    }
}

fn array_values(args: &[Value]) -> Result<Value> {
    match arg(args, 0, "array_values")? {
        Value::Array(items) => Ok(Value::Array(items.clone())),
        Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
        _ => Err(RuleError::ExecutionError(
            "array_values() 参数必须为数组".to_string(),
        )),
    }
}

fn json_encode(args: &[Value]) -> Result<Value> {
    Ok(Value::String(serde_json::to_string(arg(
        args,
        0,
        "json_encode",
    )?)?))
}

fn json_decode(args: &[Value]) -> Result<Value> {
    let text = str_arg(args, 0, "json_decode")?;
    // 解析失败返回 null
    Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
}

// ==================== 存在性 ====================

fn isset(args: &[Value]) -> Result<Value> {
    if args.is_empty() {
        return Err(RuleError::ExecutionError("isset() 至少需要一个参数".to_string()));
    }
    Ok(Value::Bool(args.iter().all(|v| !ops::is_absent(v))))
}

fn empty(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(!truthy(arg(args, 0, "empty")?)))
}

// ==================== 时间 ====================

fn timestamp_arg(args: &[Value], i: usize, function: &str) -> Result<DateTime<Local>> {
    match opt_arg(args, i) {
        None | Some(Value::Null) => Ok(Local::now()),
        Some(_) => {
            let ts = int_arg(args, i, function)?;
            Local
                .timestamp_opt(ts, 0)
                .single()
                .ok_or_else(|| RuleError::ExecutionError(format!("{function}() 无效的时间戳 {ts}")))
        }
    }
}

fn time(_args: &[Value]) -> Result<Value> {
    Ok(Value::from(Local::now().timestamp()))
}

/// 将常用的日期格式字符转换为 chrono 格式
fn convert_date_format(format: &str) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    for c in format.chars() {
        match c {
            'Y' => out.push_str("%Y"),
            'y' => out.push_str("%y"),
            'm' => out.push_str("%m"),
            'n' => out.push_str("%-m"),
            'd' => out.push_str("%d"),
            'j' => out.push_str("%-d"),
            'H' => out.push_str("%H"),
            'G' => out.push_str("%-H"),
            'i' => out.push_str("%M"),
            's' => out.push_str("%S"),
            'D' => out.push_str("%a"),
            'l' => out.push_str("%A"),
            'M' => out.push_str("%b"),
            'F' => out.push_str("%B"),
            'N' => out.push_str("%u"),
            'U' => out.push_str("%s"),
            'P' => out.push_str("%:z"),
            'O' => out.push_str("%z"),
            '%' => out.push_str("%%"),
            other => out.push(other),
        }
    }
    out
}

fn date(args: &[Value]) -> Result<Value> {
    let format = str_arg(args, 0, "date")?;
    let at = timestamp_arg(args, 1, "date")?;
    Ok(Value::String(
        at.format(&convert_date_format(&format)).to_string(),
    ))
}

fn get_iso8601_date(args: &[Value]) -> Result<Value> {
    let at = timestamp_arg(args, 0, "get_iso8601_date")?;
    Ok(Value::String(at.format("%Y-%m-%d").to_string()))
}

fn get_iso8601_date_time(args: &[Value]) -> Result<Value> {
    let at = timestamp_arg(args, 0, "get_iso8601_date_time")?;
    Ok(Value::String(at.format("%Y-%m-%dT%H:%M:%S").to_string()))
}

fn get_iso8601_date_time_with_offset(args: &[Value]) -> Result<Value> {
    let at = timestamp_arg(args, 0, "get_iso8601_date_time_with_offset")?;
    Ok(Value::String(at.format("%Y-%m-%dT%H:%M:%S%:z").to_string()))
}

fn get_rfc1123_date_time(args: &[Value]) -> Result<Value> {
    let at = timestamp_arg(args, 0, "get_rfc1123_date_time")?;
    Ok(Value::String(
        at.with_timezone(&chrono::Utc)
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string(),
    ))
}

// ==================== 杂项 ====================

fn uniqid(args: &[Value]) -> Result<Value> {
    let prefix = match opt_arg(args, 0) {
        Some(v) => to_string(v)?,
        None => String::new(),
    };
    Ok(Value::String(format!("{prefix}{}", uuid::Uuid::now_v7().simple())))
}

fn mt_rand(args: &[Value]) -> Result<Value> {
    let (low, high) = match args.len() {
        0 => (0, i64::from(i32::MAX)),
        _ => (int_arg(args, 0, "mt_rand")?, int_arg(args, 1, "mt_rand")?),
    };
    if low > high {
        return Err(RuleError::ExecutionError(format!(
            "mt_rand() 下限 {low} 大于上限 {high}"
        )));
    }
    Ok(Value::from(rand::rng().random_range(low..=high)))
}

fn sha256(args: &[Value]) -> Result<Value> {
    let input = str_arg(args, 0, "sha256")?;
    let digest = Sha256::digest(input.as_bytes());
    Ok(Value::String(
        digest.iter().map(|b| format!("{b:02x}")).collect(),
    ))
}

fn base64_encode(args: &[Value]) -> Result<Value> {
    Ok(Value::String(BASE64.encode(str_arg(args, 0, "base64_encode")?)))
}

fn base64_decode(args: &[Value]) -> Result<Value> {
    let input = str_arg(args, 0, "base64_decode")?;
    // 非法输入返回 false
    let decoded = BASE64
        .decode(input.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    Ok(decoded.map(Value::String).unwrap_or(Value::Bool(false)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: &[Value]) -> Value {
        lookup(name).unwrap()(args).unwrap()
    }

    #[test]
    fn test_round() {
        assert_eq!(call("round", &[json!(23.666555), json!(2)]), json!(23.67));
        assert_eq!(call("round", &[json!(2.5)]), json!(3.0));
        assert_eq!(call("round", &[json!(-2.5)]), json!(-3.0));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        assert!(lookup("ROUND").is_some());
        assert!(lookup("system").is_none());
        assert!(lookup("exec").is_none());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("substr", &[json!("hello"), json!(1), json!(3)]), json!("ell"));
        assert_eq!(call("substr", &[json!("hello"), json!(-3)]), json!("llo"));
        assert_eq!(call("mb_strlen", &[json!("你好")]), json!(2));
        assert_eq!(call("strlen", &[json!("你好")]), json!(6));
        assert_eq!(
            call("implode", &[json!(","), json!(["a", 1, "b"])]),
            json!("a,1,b")
        );
        assert_eq!(call("explode", &[json!(","), json!("a,b")]), json!(["a", "b"]));
        assert_eq!(call("str_contains", &[json!("abc"), json!("b")]), json!(true));
    }

    #[test]
    fn test_substr_extreme_bounds() {
        let abc = json!("abc");
        assert_eq!(call("substr", &[abc.clone(), json!(1), json!(i64::MAX)]), json!("bc"));
        assert_eq!(call("substr", &[abc.clone(), json!(i64::MIN)]), json!("abc"));
        assert_eq!(call("substr", &[abc.clone(), json!(i64::MAX)]), json!(""));
        assert_eq!(call("substr", &[abc.clone(), json!(1), json!(i64::MIN)]), json!(""));
        assert_eq!(call("substr", &[abc.clone(), json!(0), json!(-1)]), json!("ab"));
        assert_eq!(call("substr", &[abc, json!(-2), Value::Null]), json!("bc"));
    }

    #[test]
    fn test_round_extreme_precision() {
        assert_eq!(call("round", &[json!(23.666555), json!(2)]), json!(23.67));
        assert_eq!(call("round", &[json!(1.5), json!(i64::MAX)]), json!(1.5));
        assert_eq!(call("round", &[json!(1.5), json!(i64::MIN)]), json!(0.0));
    }

    #[test]
    fn test_isset_and_empty() {
        assert_eq!(call("isset", &[json!([])]), json!(false));
        assert_eq!(call("isset", &[Value::Null]), json!(false));
        assert_eq!(call("isset", &[json!(0)]), json!(true));
        assert_eq!(call("empty", &[json!("0")]), json!(true));
        assert_eq!(call("empty", &[json!("a")]), json!(false));
    }

    #[test]
    fn test_max_min() {
        assert_eq!(call("max", &[json!(1), json!(5), json!(3)]), json!(5));
        assert_eq!(call("min", &[json!([4, 2, 8])]), json!(2));
    }

    #[test]
    fn test_intval_leading_digits() {
        assert_eq!(call("intval", &[json!("12abc")]), json!(12));
        assert_eq!(call("intval", &[json!("abc")]), json!(0));
        assert_eq!(call("intval", &[json!(3.9)]), json!(3));
    }

    #[test]
    fn test_date_format_conversion() {
        assert_eq!(convert_date_format("Y-m-d H:i:s"), "%Y-%m-%d %H:%M:%S");
        let formatted = call("date", &[json!("Y"), json!(0)]);
        assert!(formatted.as_str().unwrap().starts_with("19"));
    }

    #[test]
    fn test_sha256_and_base64() {
        assert_eq!(
            call("sha256", &[json!("abc")]),
            json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(call("base64_encode", &[json!("hi")]), json!("aGk="));
        assert_eq!(call("base64_decode", &[json!("aGk=")]), json!("hi"));
    }

    #[test]
    fn test_mt_rand_range() {
        let v = call("mt_rand", &[json!(1), json!(3)]).as_i64().unwrap();
        assert!((1..=3).contains(&v));
    }
}
