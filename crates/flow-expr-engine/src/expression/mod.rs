//! 表达式模型
//!
//! 表达式是有序的表达式项列表，按顺序拼接成可执行代码。
//! 展示值类型（日期、选择、成员等）不生成运算代码，直接按展示值求值。

pub mod builder;
pub mod codegen;
pub mod display;
pub mod trans;

use crate::context::EngineContext;
use crate::error::Result;
use crate::value::Value;
use serde_json::{Map, Value as JsonValue, json};
use tracing::debug;

pub use builder::ExpressionBuilder;

// ==================== 枚举 ====================

/// 表达式项类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionType {
    Input,
    Field,
    Methods,
    Datetime,
    Select,
    Multiple,
    Checkbox,
    Member,
    Names,
}

impl ExpressionType {
    pub fn make(value: &str) -> Option<Self> {
        let item_type = match value {
            "input" => Self::Input,
            "fields" => Self::Field,
            "methods" => Self::Methods,
            "datetime" => Self::Datetime,
            "select" => Self::Select,
            "multiple" => Self::Multiple,
            "checkbox" => Self::Checkbox,
            "member" => Self::Member,
            "names" => Self::Names,
            _ => return None,
        };
        Some(item_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Field => "fields",
            Self::Methods => "methods",
            Self::Datetime => "datetime",
            Self::Select => "select",
            Self::Multiple => "multiple",
            Self::Checkbox => "checkbox",
            Self::Member => "member",
            Self::Names => "names",
        }
    }

    /// 展示值类型，取值保存在 `{type}_value` 中
    pub fn is_display_value(&self) -> bool {
        matches!(
            self,
            Self::Datetime
                | Self::Select
                | Self::Multiple
                | Self::Checkbox
                | Self::Member
                | Self::Names
        )
    }

    pub fn display_value_key(&self) -> String {
        format!("{}_value", self.as_str())
    }
}

/// 值类型：固定值或表达式
///
/// 既用于 [`Value`] 本身，也用于表达式项的 `value_type`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    Const,
    #[default]
    Expression,
}

impl ValueType {
    pub fn make(value: &str) -> Option<Self> {
        match value {
            "const" => Some(Self::Const),
            "expression" => Some(Self::Expression),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Const => "const",
            Self::Expression => "expression",
        }
    }
}

// ==================== 表达式项 ====================

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionItem {
    item_type: ExpressionType,
    value: JsonValue,
    name: String,
    args: Option<Vec<Value>>,
    value_type: ValueType,
    trans: Option<String>,
    display_value: Option<JsonValue>,
}

impl ExpressionItem {
    pub fn new(item_type: ExpressionType, value: impl Into<JsonValue>) -> Self {
        Self {
            item_type,
            value: value.into(),
            name: String::new(),
            args: None,
            value_type: ValueType::default(),
            trans: None,
            display_value: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = (!args.is_empty()).then_some(args);
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_trans(mut self, trans: impl Into<String>) -> Self {
        let trans = trans.into();
        self.trans = (!trans.is_empty()).then_some(trans);
        self
    }

    pub fn with_display_value(mut self, display_value: JsonValue) -> Self {
        self.display_value = (!display_value.is_null()).then_some(display_value);
        self
    }

    pub fn item_type(&self) -> ExpressionType {
        self.item_type
    }

    pub fn value(&self) -> &JsonValue {
        &self.value
    }

    /// 字段路径或函数名
    pub fn value_str(&self) -> String {
        match &self.value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> Option<&[Value]> {
        self.args.as_deref()
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub(crate) fn set_value_type(&mut self, value_type: ValueType) {
        self.value_type = value_type;
    }

    pub fn trans(&self) -> Option<&str> {
        self.trans.as_deref()
    }

    /// 转换后的值在数据源中的键
    pub fn trans_key(&self) -> Option<String> {
        self.trans
            .as_deref()
            .map(|trans| trans::trans_key(&self.value_str(), trans))
    }

    pub fn display_value(&self) -> Option<&JsonValue> {
        self.display_value.as_ref()
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert("type".to_string(), json!(self.item_type.as_str()));
        map.insert("value".to_string(), self.value.clone());
        map.insert("name".to_string(), json!(self.name));
        map.insert(
            "args".to_string(),
            match &self.args {
                Some(args) => JsonValue::Array(args.iter().map(Value::to_json).collect()),
                None => JsonValue::Null,
            },
        );
        if let Some(trans) = &self.trans {
            map.insert("trans".to_string(), json!(trans));
        }
        if self.item_type.is_display_value() {
            map.insert(
                self.item_type.display_value_key(),
                self.display_value.clone().unwrap_or(JsonValue::Null),
            );
        }
        JsonValue::Object(map)
    }
}

// ==================== 表达式 ====================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expression {
    items: Vec<ExpressionItem>,
    string_template: bool,
}

impl Expression {
    pub fn new(items: Vec<ExpressionItem>) -> Self {
        Self {
            items,
            string_template: false,
        }
    }

    pub fn items(&self) -> &[ExpressionItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_string_template(&self) -> bool {
        self.string_template
    }

    /// 标记为字符串模板，所有输入项都改为按字符串常量处理
    pub fn set_string_template(&mut self, string_template: bool) {
        self.string_template = string_template;
        if string_template {
            for item in &mut self.items {
                if item.item_type == ExpressionType::Input {
                    item.set_value_type(ValueType::Const);
                }
            }
        }
    }

    pub fn first_item(&self) -> Option<&ExpressionItem> {
        self.items.first()
    }

    /// 旧版固定值：只有一个输入项
    pub fn is_old_const_value(&self) -> bool {
        self.items.len() == 1 && self.items[0].item_type == ExpressionType::Input
    }

    /// 只有一个展示值类型的项
    pub fn is_display_const_value(&self) -> bool {
        self.items.len() == 1 && self.items[0].item_type.is_display_value()
    }

    /// 首项为输入项时返回其字面量
    pub fn const_literal(&self) -> Option<&JsonValue> {
        self.items
            .first()
            .filter(|item| item.item_type == ExpressionType::Input)
            .map(|item| &item.value)
    }

    /// 所有字段引用项，包括函数参数中的
    pub fn all_field_items(&self) -> Vec<&ExpressionItem> {
        let mut fields = Vec::new();
        for item in &self.items {
            if item.item_type == ExpressionType::Field {
                fields.push(item);
            }
            for arg in item.args().unwrap_or_default() {
                fields.extend(arg.all_field_items());
            }
        }
        fields
    }

    /// 不含字段引用与函数调用
    pub fn is_literal_only(&self) -> bool {
        self.items
            .iter()
            .all(|item| !matches!(item.item_type, ExpressionType::Field | ExpressionType::Methods))
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.items.iter().map(ExpressionItem::to_json).collect())
    }

    /// 生成可执行代码，`wrap` 时外加一层括号
    pub fn code(&self, wrap: bool) -> String {
        let code = codegen::expression_code(self);
        if wrap { format!("({code})") } else { code }
    }

    /// 执行表达式，`exec` 为 false 时不执行直接返回 None
    pub fn result(
        &self,
        ctx: &EngineContext,
        source: &JsonValue,
        exec: bool,
    ) -> Result<Option<JsonValue>> {
        if !exec {
            return Ok(None);
        }
        let code = self.code(false);
        let source = self.with_trans_values(source);
        debug!(code = %code, "执行表达式");
        let result = ctx.run(&code, &source)?;
        Ok((!result.is_null()).then_some(result))
    }

    /// 单个展示值项的取值
    pub fn display_result(
        &self,
        ctx: &EngineContext,
        source: &JsonValue,
    ) -> Result<Option<JsonValue>> {
        match self.items.first() {
            Some(item) => display::resolve(ctx, item, source),
            None => Ok(None),
        }
    }

    /// 带转换链的字段先转换，再以转换键写回数据源
    pub fn with_trans_values(&self, source: &JsonValue) -> JsonValue {
        let mut data = match source {
            JsonValue::Object(map) => map.clone(),
            _ => Map::new(),
        };
        trans::bind_trans_values(self, &mut data, true);
        JsonValue::Object(data)
    }
}
