//! 展示值求值
//!
//! 日期、选择、成员等控件保存的是界面上的选择结果，求值时不生成代码，
//! 直接按展示值换算：日期关键字换算为具体时间，成员列表中的字段引用按数据源取值。

use super::{ExpressionItem, ExpressionType};
use crate::context::EngineContext;
use crate::error::Result;
use crate::value::Value;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_LAYOUTS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// 解析日期时间文本，只有日期时取当天零点
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("now") {
        return Some(Local::now().naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for layout in DATETIME_LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, layout) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn midnight(date: Option<NaiveDate>) -> Option<NaiveDateTime> {
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// 日期控件的取值：`yesterday` / `today` / `tomorrow` 为当天零点，
/// `designation` 取指定时间，`trigger_time` 取当前时间
pub fn datetime_value(display: Option<&JsonValue>) -> Option<String> {
    let field = |name: &str| {
        display
            .and_then(|d| d.get(name))
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let kind = field("type");
    let value = field("value");
    let today = Local::now().date_naive();

    let datetime = match kind.as_str() {
        "yesterday" => midnight(today.pred_opt()),
        "today" => midnight(Some(today)),
        "tomorrow" => midnight(today.succ_opt()),
        "designation" if value.is_empty() => None,
        "designation" => parse_datetime(&value),
        "trigger_time" => Some(Local::now().naive_local()),
        other => parse_datetime(other),
    };
    datetime.map(|dt| dt.format(DATETIME_FORMAT).to_string())
}

/// 不依赖数据源的展示值，用于代码生成
pub fn static_value(item: &ExpressionItem) -> JsonValue {
    match item.item_type() {
        ExpressionType::Datetime => datetime_value(item.display_value())
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
        _ => item.display_value().cloned().unwrap_or(JsonValue::Null),
    }
}

pub fn resolve(
    ctx: &EngineContext,
    item: &ExpressionItem,
    source: &JsonValue,
) -> Result<Option<JsonValue>> {
    match item.item_type() {
        ExpressionType::Member | ExpressionType::Names => {
            let Some(JsonValue::Array(list)) = item.display_value() else {
                return Ok(item.display_value().cloned());
            };
            let mut resolved = Vec::with_capacity(list.len());
            for entry in list {
                resolved.push(resolve_member(ctx, entry, source)?);
            }
            Ok(Some(JsonValue::Array(resolved)))
        }
        _ => Ok(Some(static_value(item)).filter(|v| !v.is_null())),
    }
}

/// 成员列表中 `{"type": "fields", "value": path}` 的条目按数据源取值
fn resolve_member(ctx: &EngineContext, entry: &JsonValue, source: &JsonValue) -> Result<JsonValue> {
    let is_field = entry.get("type").and_then(JsonValue::as_str)
        == Some(ExpressionType::Field.as_str());
    if !is_field {
        return Ok(entry.clone());
    }
    let path = entry
        .get("value")
        .and_then(JsonValue::as_str)
        .unwrap_or_default();
    match Value::build_expression(path) {
        Some(value) => Ok(value
            .result(ctx, source, false, true, "")?
            .unwrap_or(JsonValue::Null)),
        None => Ok(entry.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_datetime() {
        let dt = parse_datetime("2024-05-01 08:30:00").unwrap();
        assert_eq!(dt.format(DATETIME_FORMAT).to_string(), "2024-05-01 08:30:00");

        let dt = parse_datetime("2024-05-01").unwrap();
        assert_eq!(dt.format(DATETIME_FORMAT).to_string(), "2024-05-01 00:00:00");

        assert!(parse_datetime("not a date").is_none());
    }

    #[test]
    fn test_datetime_keywords() {
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(
            datetime_value(Some(&json!({"type": "today"}))),
            Some(format!("{today} 00:00:00"))
        );
        assert_eq!(
            datetime_value(Some(&json!({"type": "designation", "value": "2023-01-02 03:04:05"}))),
            Some("2023-01-02 03:04:05".to_string())
        );
        assert_eq!(datetime_value(Some(&json!({"type": "designation", "value": ""}))), None);
        assert!(datetime_value(Some(&json!({"type": "trigger_time"}))).is_some());
        assert_eq!(datetime_value(None), None);
    }

    #[test]
    fn test_resolve_members() {
        let ctx = EngineContext::default();
        let item = ExpressionItem::new(ExpressionType::Member, JsonValue::Null).with_display_value(
            json!([{"type": "user", "id": "u1"}, {"type": "fields", "value": "form.owner"}]),
        );
        let resolved = resolve(&ctx, &item, &json!({"form": {"owner": "u2"}})).unwrap();
        assert_eq!(resolved, Some(json!([{"type": "user", "id": "u1"}, "u2"])));
    }

    #[test]
    fn test_resolve_select() {
        let ctx = EngineContext::default();
        let item = ExpressionItem::new(ExpressionType::Select, JsonValue::Null)
            .with_display_value(json!(["a", "b"]));
        assert_eq!(resolve(&ctx, &item, &json!({})).unwrap(), Some(json!(["a", "b"])));
    }
}
