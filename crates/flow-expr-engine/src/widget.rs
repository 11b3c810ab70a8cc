//! 控件
//!
//! 控件与表单共用同一棵节点树，额外携带展示配置、初始值与展示选项。
//! 实际运算时 `value` 为空则取 `initial_value`。

use crate::error::{FlowExprError, Result};
use crate::form::{Form, FormType};
use crate::value::Value;
use flow_shared::crypto::DESENSITIZE_MASK;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::ops::{Deref, DerefMut};

/// 需要脱敏展示的控件类型
const DESENSITIZATION_WIDGET_TYPES: [&str; 2] = ["password", "secret"];

// ==================== 展示配置 ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub widget_type: String,
    #[serde(default)]
    pub tooltips: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub allow_expression: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub extra: Option<JsonValue>,
}

fn default_visible() -> bool {
    true
}

impl DisplayConfig {
    /// 由原始结构创建，null 或空对象返回 None
    pub fn create(raw: Option<&JsonValue>) -> Result<Option<Self>> {
        match raw {
            Some(JsonValue::Object(map)) if !map.is_empty() => {
                let config = serde_json::from_value(JsonValue::Object(map.clone())).map_err(|e| {
                    FlowExprError::validation(format!("display_config 格式错误: {e}"))
                })?;
                Ok(Some(config))
            }
            _ => Ok(None),
        }
    }

    pub fn is_desensitization(&self) -> bool {
        DESENSITIZATION_WIDGET_TYPES.contains(&self.widget_type.as_str())
    }

    /// 下拉类控件的附加配置
    pub fn select_extra(&self) -> Option<SelectExtra> {
        self.extra.as_ref().map(SelectExtra::create)
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// 下拉选项来源：静态 `data_source`，或 `dynamic_fields` 时由接口组件提供
#[derive(Debug, Clone, PartialEq)]
pub struct SelectExtra {
    pub dynamic_fields: bool,
    pub data_source: Option<Vec<JsonValue>>,
    pub data_source_api: Option<JsonValue>,
}

impl SelectExtra {
    pub fn create(extra: &JsonValue) -> Self {
        let dynamic_fields = extra
            .get("dynamic_fields")
            .is_some_and(rule_engine_core::sandbox::ops::truthy);
        if dynamic_fields {
            return Self {
                dynamic_fields,
                data_source: None,
                data_source_api: extra.get("data_source_api").filter(|v| !v.is_null()).cloned(),
            };
        }
        let data_source = match extra.get("data_source") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(list)) => list.clone(),
            Some(JsonValue::Object(map)) => map.values().cloned().collect(),
            Some(other) => vec![other.clone()],
        };
        Self {
            dynamic_fields,
            data_source: Some(data_source),
            data_source_api: None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "dynamic_fields": self.dynamic_fields,
            "data_source": self.data_source,
            "data_source_api": self.data_source_api,
        })
    }
}

/// 展示选项
#[derive(Debug, Clone, PartialEq)]
pub struct ShowOptions {
    desensitization: bool,
    mask: String,
}

impl ShowOptions {
    pub fn new(desensitization: bool) -> Self {
        Self {
            desensitization,
            mask: DESENSITIZE_MASK.to_string(),
        }
    }

    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = mask.into();
        self
    }

    pub fn is_desensitization(&self) -> bool {
        self.desensitization
    }

    pub fn mask(&self) -> &str {
        &self.mask
    }
}

impl Default for ShowOptions {
    fn default() -> Self {
        Self::new(false)
    }
}

// ==================== 控件 ====================

/// 控件树的根节点
#[derive(Debug, Clone, PartialEq)]
pub struct Widget(Form);

impl Widget {
    pub fn new(root: Form) -> Self {
        Self(root)
    }

    pub fn into_form(self) -> Form {
        self.0
    }

    pub fn validate(&self) -> Result<()> {
        validate_node(&self.0, None)
    }

    pub fn to_json(&self) -> JsonValue {
        widget_json(&self.0)
    }
}

impl Deref for Widget {
    type Target = Form;

    fn deref(&self) -> &Form {
        &self.0
    }
}

impl DerefMut for Widget {
    fn deref_mut(&mut self) -> &mut Form {
        &mut self.0
    }
}

/// 校验控件取值，`display_config` 为空时使用节点自身的配置
///
/// 对象的下级节点使用各自的配置，对象数组的元素沿用数组的配置。
fn validate_node(node: &Form, display_config: Option<&DisplayConfig>) -> Result<()> {
    let display_config = display_config.or(node.display_config());
    let label = format!(
        "{}[{}] ",
        display_config
            .and_then(|c| c.label.clone())
            .unwrap_or_else(|| node.key().to_string()),
        node.key()
    );
    let required = display_config.is_some_and(|c| c.required);
    let allow_expression = display_config.is_some_and(|c| c.allow_expression);
    let value = node.shown_value();

    match node.form_type() {
        FormType::Object => {
            for (_, property) in node.properties().unwrap_or_default() {
                validate_node(property, None)?;
            }
        }
        FormType::Array => {
            let Some(item_type) = node.items().map(Form::form_type) else {
                return Err(FlowExprError::validation(format!("{label}items不能为空")));
            };
            if item_type.is_basic() {
                match &value {
                    Some(value) => {
                        if required && value.is_empty() {
                            return Err(FlowExprError::validation(format!("{label}不能为空")));
                        }
                        if !allow_expression && value.is_expression() {
                            return Err(FlowExprError::validation(format!("{label}不允许使用表达式")));
                        }
                    }
                    None => {
                        if required && node.properties().is_none_or(<[_]>::is_empty) {
                            return Err(FlowExprError::validation(format!("{label}不能为空")));
                        }
                    }
                }
            }
            if item_type.is_object() {
                for (_, property) in node.properties().unwrap_or_default() {
                    validate_node(property, display_config)?;
                }
            }
        }
        _ => {
            if !node.is_root() && display_config.is_none() {
                return Err(FlowExprError::validation(format!(
                    "[{}] display_config不能为空",
                    node.key()
                )));
            }
            if required && value.as_ref().is_none_or(Value::is_empty) {
                return Err(FlowExprError::validation(format!("{label}不能为空")));
            }
            if !allow_expression && value.as_ref().is_some_and(Value::is_expression) {
                return Err(FlowExprError::validation(format!("{label}不允许使用表达式")));
            }
        }
    }
    Ok(())
}

fn widget_json(node: &Form) -> JsonValue {
    let properties = node.properties().map(|properties| {
        if node.form_type().is_array() {
            JsonValue::Array(properties.iter().map(|(_, p)| widget_json(p)).collect())
        } else {
            let map: Map<String, JsonValue> = properties
                .iter()
                .map(|(key, p)| (key.clone(), widget_json(p)))
                .collect();
            JsonValue::Object(map)
        }
    });

    json!({
        "type": node.form_type().as_str(),
        "key": node.key(),
        "sort": node.sort(),
        "title": node.title(),
        "description": node.description(),
        "initial_value": node.initial_value().map(Value::to_json),
        "value": node.shown_value().as_ref().map(Value::to_json),
        "display_config": node.display_config().map(DisplayConfig::to_json),
        "items": node.items().map(widget_json),
        "properties": properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::WidgetBuilder;

    fn basic_widget(display_config: JsonValue, value: JsonValue) -> Widget {
        WidgetBuilder::default()
            .build(&json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "title": "名称",
                        "value": value,
                        "display_config": display_config
                    }
                }
            }))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_display_config_create() {
        assert!(DisplayConfig::create(None).unwrap().is_none());
        assert!(DisplayConfig::create(Some(&json!({}))).unwrap().is_none());

        let config = DisplayConfig::create(Some(&json!({"label": "密码", "widget_type": "password"})))
            .unwrap()
            .unwrap();
        assert!(config.is_desensitization());
        assert!(config.visible);
        assert!(!config.required);

        assert!(DisplayConfig::create(Some(&json!({"required": "yes"}))).is_err());
    }

    #[test]
    fn test_select_extra() {
        let extra = SelectExtra::create(&json!({"data_source": [{"label": "A", "value": "a"}]}));
        assert!(!extra.dynamic_fields);
        assert_eq!(extra.data_source.as_ref().map(Vec::len), Some(1));

        let extra = SelectExtra::create(&json!({"dynamic_fields": true, "data_source_api": {"id": "api-1"}}));
        assert!(extra.data_source.is_none());
        assert_eq!(
            extra.to_json(),
            json!({"dynamic_fields": true, "data_source": null, "data_source_api": {"id": "api-1"}})
        );
    }

    #[test]
    fn test_validate_required() {
        let config = json!({"label": "名称", "widget_type": "input", "required": true, "allow_expression": true});
        let widget = basic_widget(config.clone(), JsonValue::Null);
        let err = widget.validate().unwrap_err();
        assert_eq!(err.to_string(), "名称[name] 不能为空");

        let widget = basic_widget(
            config,
            json!({"type": "const", "const_value": [{"type": "input", "value": "x", "name": ""}]}),
        );
        assert!(widget.validate().is_ok());
    }

    #[test]
    fn test_validate_expression_not_allowed() {
        let widget = basic_widget(
            json!({"label": "名称", "widget_type": "input", "allow_expression": false}),
            json!({"type": "expression", "expression_value": [{"type": "fields", "value": "a", "name": ""}]}),
        );
        assert_eq!(widget.validate().unwrap_err().to_string(), "名称[name] 不允许使用表达式");
    }

    #[test]
    fn test_validate_missing_display_config() {
        let widget = basic_widget(JsonValue::Null, JsonValue::Null);
        assert_eq!(
            widget.validate().unwrap_err().to_string(),
            "[name] display_config不能为空"
        );
    }

    #[test]
    fn test_desensitized_value() {
        let raw = json!({
            "type": "object",
            "properties": {
                "token": {
                    "type": "string",
                    "value": {"type": "const", "const_value": [{"type": "input", "value": "s3cr3t", "name": ""}]},
                    "display_config": {"widget_type": "password"}
                }
            }
        });
        let masked = WidgetBuilder::new(Some(ShowOptions::new(true))).build(&raw).unwrap().unwrap();
        let json = masked.to_json();
        assert_eq!(
            json["properties"]["token"]["value"]["const_value"][0]["value"],
            json!(DESENSITIZE_MASK)
        );

        let plain = WidgetBuilder::new(None).build(&raw).unwrap().unwrap();
        assert_eq!(
            plain.to_json()["properties"]["token"]["value"]["const_value"][0]["value"],
            json!("s3cr3t")
        );
    }
}
