//! 表达式构建器

use super::{Expression, ExpressionItem, ExpressionType, ValueType};
use crate::value::Value;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Deserialize)]
struct RawExpressionItem {
    #[serde(rename = "type", default)]
    item_type: Option<String>,
    #[serde(default)]
    value: JsonValue,
    #[serde(default)]
    name: JsonValue,
    #[serde(default)]
    args: Option<Vec<JsonValue>>,
    #[serde(default)]
    value_type: Option<String>,
    #[serde(default)]
    trans: Option<String>,
    #[serde(flatten)]
    extra: Map<String, JsonValue>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionBuilder;

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self
    }

    /// 由原始表达式项列表构建，没有有效项时返回 None
    pub fn build(&self, raw: &JsonValue) -> Option<Expression> {
        Self::build_with(raw, ValueType::Expression)
    }

    /// `default_value_type` 为未声明 `value_type` 的项的默认值
    pub(crate) fn build_with(raw: &JsonValue, default_value_type: ValueType) -> Option<Expression> {
        let list = raw.as_array()?;
        let count = list.len();
        let items: Vec<_> = list
            .iter()
            .enumerate()
            .filter_map(|(i, raw_item)| {
                let item = Self::build_item(raw_item, default_value_type)?;
                let at_boundary = i == 0 || i + 1 == count;
                (!(at_boundary && is_blank_input(&item))).then_some(item)
            })
            .collect();
        (!items.is_empty()).then(|| Expression::new(items))
    }

    fn build_item(raw: &JsonValue, default_value_type: ValueType) -> Option<ExpressionItem> {
        let raw: RawExpressionItem = serde_json::from_value(raw.clone()).ok()?;
        let item_type = ExpressionType::make(raw.item_type.as_deref()?)?;
        if raw.value.is_null() && !item_type.is_display_value() {
            return None;
        }

        let value_type = raw
            .value_type
            .as_deref()
            .and_then(ValueType::make)
            .unwrap_or(default_value_type);
        let args: Vec<Value> = raw
            .args
            .unwrap_or_default()
            .iter()
            .filter_map(Value::build)
            .collect();
        let name = match raw.name {
            JsonValue::String(s) => s,
            JsonValue::Null => String::new(),
            other => other.to_string(),
        };

        let mut item = ExpressionItem::new(item_type, raw.value)
            .with_name(name)
            .with_value_type(value_type)
            .with_args(args);
        if let Some(trans) = raw.trans {
            item = item.with_trans(trans);
        }
        if item_type.is_display_value()
            && let Some(display) = raw.extra.get(&item_type.display_value_key())
        {
            item = item.with_display_value(display.clone());
        }
        Some(item)
    }
}

/// 首尾位置的空白输入项会被丢弃
fn is_blank_input(item: &ExpressionItem) -> bool {
    item.item_type() == ExpressionType::Input
        && item.value().as_str().is_some_and(|s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_empty() {
        let builder = ExpressionBuilder::new();
        assert!(builder.build(&json!([])).is_none());
        assert!(builder.build(&json!(null)).is_none());
        assert!(builder.build(&json!([{"type": "unknown", "value": "x"}])).is_none());
    }

    #[test]
    fn test_boundary_blank_inputs_dropped() {
        let expression = ExpressionBuilder::new()
            .build(&json!([
                {"type": "input", "value": "  ", "name": ""},
                {"type": "fields", "value": "a", "name": ""},
                {"type": "input", "value": " ", "name": ""},
                {"type": "fields", "value": "b", "name": ""},
                {"type": "input", "value": "", "name": ""}
            ]))
            .unwrap();
        let types: Vec<_> = expression.items().iter().map(|i| i.item_type()).collect();
        assert_eq!(
            types,
            vec![ExpressionType::Field, ExpressionType::Input, ExpressionType::Field]
        );
    }

    #[test]
    fn test_null_value_skipped_except_display() {
        let expression = ExpressionBuilder::new()
            .build(&json!([
                {"type": "fields", "value": null},
                {"type": "checkbox", "value": null, "checkbox_value": [1, 2]}
            ]))
            .unwrap();
        assert_eq!(expression.items().len(), 1);
        assert_eq!(expression.items()[0].display_value(), Some(&json!([1, 2])));
    }

    #[test]
    fn test_value_type_default() {
        let raw = json!([{"type": "input", "value": "1"}]);
        let expression = ExpressionBuilder::build_with(&raw, ValueType::Const).unwrap();
        assert_eq!(expression.items()[0].value_type(), ValueType::Const);

        let expression = ExpressionBuilder::new().build(&raw).unwrap();
        assert_eq!(expression.items()[0].value_type(), ValueType::Expression);
    }

    #[test]
    fn test_methods_args() {
        let expression = ExpressionBuilder::new()
            .build(&json!([{
                "type": "methods",
                "value": "round",
                "name": "round",
                "args": [
                    {"type": "const", "const_value": [{"type": "input", "value": "1.234", "name": "", "args": null}], "expression_value": null},
                    {"type": "unknown"}
                ]
            }]))
            .unwrap();
        assert_eq!(expression.items()[0].args().map(<[Value]>::len), Some(1));
        assert_eq!(expression.code(false), "round((1.234))");
    }
}
