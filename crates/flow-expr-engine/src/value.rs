//! 值模型
//!
//! 值是固定值与表达式的二选一，可选的 [`DataType`] 只在格式化运行结果时生效。
//!
//! | DataType | 接受 | 转换 |
//! |---|---|---|
//! | String | 数字、字符串 | 转为字符串 |
//! | Number | 数字、数字字符串、带整数前缀的字符串 | 转为数字字符串 |
//! | Array / Object | 数组 | 原样 |
//! | Boolean | 任意 | `"true"` / `"false"` 先转布尔，其余按真值 |
//! | Null | 任意 | null |
//! | Expression / 未设置 | 任意 | 原样 |

use crate::context::EngineContext;
use crate::error::{FlowExprError, Result};
use crate::expression::{Expression, ExpressionBuilder, ExpressionItem, ExpressionType, ValueType};
use regex::Regex;
use rule_engine_core::sandbox::ops;
use serde_json::{Value as JsonValue, json};
use std::sync::LazyLock;

static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*([+-]?\d+)").unwrap());

/// 结果数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Number,
    Array,
    Object,
    Boolean,
    Null,
    Expression,
}

impl DataType {
    /// 兼容表单类型名，`integer` 视为 `Number`
    pub fn make(value: &str) -> Option<Self> {
        let data_type = match value {
            "string" => Self::String,
            "number" | "integer" => Self::Number,
            "array" => Self::Array,
            "object" => Self::Object,
            "boolean" => Self::Boolean,
            "null" => Self::Null,
            "expression" => Self::Expression,
            _ => return None,
        };
        Some(data_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Array => "array",
            Self::Object => "object",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::Expression => "expression",
        }
    }
}

/// 值的来源
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Const(Option<Expression>),
    Expression(Option<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    source: ValueSource,
    data_type: Option<DataType>,
}

impl Value {
    /// 固定值，非单一字面量的固定值按字符串模板处理
    pub fn new_const(expression: Option<Expression>) -> Self {
        let expression = expression.map(|mut e| {
            if !e.is_old_const_value() && !e.is_display_const_value() {
                e.set_string_template(true);
            }
            e
        });
        Self {
            source: ValueSource::Const(expression),
            data_type: None,
        }
    }

    pub fn new_expression(expression: Option<Expression>) -> Self {
        Self {
            source: ValueSource::Expression(expression),
            data_type: None,
        }
    }

    pub fn with_data_type(mut self, data_type: Option<DataType>) -> Self {
        self.data_type = data_type;
        self
    }

    // ==================== 构建 ====================

    /// 由原始结构构建：`{type, const_value, expression_value, data_type?}`
    pub fn build(raw: &JsonValue) -> Option<Self> {
        let map = raw.as_object().filter(|m| !m.is_empty())?;
        let data_type = map
            .get("data_type")
            .and_then(JsonValue::as_str)
            .and_then(DataType::make);

        let value = match map.get("type").and_then(JsonValue::as_str)? {
            "const" => {
                let expression = map
                    .get("const_value")
                    .and_then(|raw| ExpressionBuilder::build_with(raw, ValueType::Const))
                    .unwrap_or_else(|| {
                        Expression::new(vec![
                            ExpressionItem::new(ExpressionType::Input, "")
                                .with_value_type(ValueType::Const),
                        ])
                    });
                Self::new_const(Some(expression))
            }
            "expression" => Self::new_expression(
                map.get("expression_value")
                    .and_then(|raw| ExpressionBuilder::build_with(raw, ValueType::Expression)),
            ),
            _ => return None,
        };
        Some(value.with_data_type(data_type))
    }

    /// 单个字面量的固定值，null 返回 None
    pub fn build_const(value: impl Into<JsonValue>) -> Option<Self> {
        let value = value.into();
        if value.is_null() {
            return None;
        }
        let item = ExpressionItem::new(ExpressionType::Input, value)
            .with_name("append_const_value")
            .with_value_type(ValueType::Const);
        Some(Self::new_const(Some(Expression::new(vec![item]))))
    }

    /// 引用单个字段的表达式，路径为空返回 None
    pub fn build_expression(path: &str) -> Option<Self> {
        if path.is_empty() {
            return None;
        }
        let item = ExpressionItem::new(ExpressionType::Field, path);
        Some(Self::new_expression(Some(Expression::new(vec![item]))))
    }

    // ==================== 访问 ====================

    pub fn source(&self) -> &ValueSource {
        &self.source
    }

    pub fn value_type(&self) -> ValueType {
        match self.source {
            ValueSource::Const(_) => ValueType::Const,
            ValueSource::Expression(_) => ValueType::Expression,
        }
    }

    pub fn is_expression(&self) -> bool {
        self.value_type() == ValueType::Expression
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    pub fn set_data_type(&mut self, data_type: Option<DataType>) {
        self.data_type = data_type;
    }

    pub fn expression(&self) -> Option<&Expression> {
        match &self.source {
            ValueSource::Const(e) | ValueSource::Expression(e) => e.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.expression().is_none_or(Expression::is_empty)
    }

    pub fn is_old_const_value(&self) -> bool {
        self.expression().is_some_and(Expression::is_old_const_value)
    }

    /// 单一数字字面量的固定值
    pub fn is_const_number(&self) -> bool {
        matches!(self.source, ValueSource::Const(_))
            && self.is_old_const_value()
            && self
                .expression()
                .and_then(Expression::const_literal)
                .is_some_and(ops::is_numeric)
    }

    /// 表达式类型且以字段引用开头，`filter` 非空时字段路径还需与之相同
    pub fn expression_is_only_fields(&self, filter: &str) -> bool {
        let ValueSource::Expression(expression) = &self.source else {
            return false;
        };
        let Some(first) = expression.as_ref().and_then(Expression::first_item) else {
            return true;
        };
        first.item_type() == ExpressionType::Field
            && (filter.is_empty() || first.value_str() == filter)
    }

    pub fn all_field_items(&self) -> Vec<&ExpressionItem> {
        self.expression()
            .map(Expression::all_field_items)
            .unwrap_or_default()
    }

    /// 不含字段引用与函数调用
    pub fn is_literal_only(&self) -> bool {
        self.expression().is_none_or(Expression::is_literal_only)
    }

    pub fn code(&self) -> String {
        self.expression()
            .map(|e| e.code(false))
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> JsonValue {
        let payload = |e: &Option<Expression>| e.as_ref().map_or(JsonValue::Null, Expression::to_json);
        match &self.source {
            ValueSource::Const(e) => json!({
                "type": "const",
                "const_value": payload(e),
                "expression_value": null,
            }),
            ValueSource::Expression(e) => json!({
                "type": "expression",
                "const_value": null,
                "expression_value": payload(e),
            }),
        }
    }

    // ==================== 求值 ====================

    /// 计算并按 `DataType` 格式化结果
    ///
    /// 单一字面量直接返回字面量，不经过规则引擎；`check` 为 false 时类型不符返回 None。
    pub fn result(
        &self,
        ctx: &EngineContext,
        source: &JsonValue,
        check: bool,
        exec: bool,
        label: &str,
    ) -> Result<Option<JsonValue>> {
        let raw = match &self.source {
            ValueSource::Const(Some(e)) if e.is_old_const_value() => e.const_literal().cloned(),
            ValueSource::Const(Some(e)) if e.is_display_const_value() => {
                e.display_result(ctx, source)?
            }
            ValueSource::Expression(Some(e)) if e.is_old_const_value() => {
                e.const_literal().cloned()
            }
            ValueSource::Const(Some(e)) | ValueSource::Expression(Some(e)) => {
                e.result(ctx, source, exec)?
            }
            ValueSource::Const(None) | ValueSource::Expression(None) => None,
        };
        self.format(raw, check, label)
    }

    pub fn format(&self, raw: Option<JsonValue>, check: bool, label: &str) -> Result<Option<JsonValue>> {
        let Some(value) = raw.filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let Some(data_type) = self.data_type else {
            return Ok(Some(value));
        };
        let fail = |value: &JsonValue| {
            if check {
                Err(FlowExprError::TypeCoercion(format!(
                    "{label} 结果为 {}，无法被转换为 {}",
                    ops::type_name(value),
                    data_type.as_str()
                )))
            } else {
                Ok(None)
            }
        };

        match data_type {
            DataType::Expression => Ok(Some(value)),
            DataType::Null => Ok(None),
            DataType::String => match value {
                JsonValue::String(_) => Ok(Some(value)),
                JsonValue::Number(ref n) => Ok(Some(JsonValue::String(ops::number_to_string(n)))),
                _ => fail(&value),
            },
            DataType::Number => {
                if let Some(n) = ops::as_numeric(&value) {
                    return Ok(Some(JsonValue::String(number_string(n.into_value()))));
                }
                let prefix = value
                    .as_str()
                    .and_then(|s| LEADING_INT.captures(s))
                    .and_then(|caps| caps[1].parse::<i64>().ok());
                match prefix {
                    Some(i) => Ok(Some(JsonValue::String(i.to_string()))),
                    None => fail(&value),
                }
            }
            DataType::Array | DataType::Object => match value {
                JsonValue::Array(_) | JsonValue::Object(_) => Ok(Some(value)),
                _ => fail(&value),
            },
            DataType::Boolean => {
                let flag = match &value {
                    JsonValue::String(s) if s == "true" => true,
                    JsonValue::String(s) if s == "false" => false,
                    other => ops::truthy(other),
                };
                Ok(Some(JsonValue::Bool(flag)))
            }
        }
    }
}

fn number_string(value: JsonValue) -> String {
    match value {
        JsonValue::Number(n) => ops::number_to_string(&n),
        other => other.to_string(),
    }
}
