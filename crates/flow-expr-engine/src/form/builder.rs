//! 表单与控件构建器
//!
//! 两者的结构相同：根节点必须是 object 或 array，下级字段先按 `sort` 排序再从 0 重新编号。
//! 表单额外读取 `required` 与加密配置，控件额外读取展示配置与初始值。

use super::{Form, FormType, ROOT_KEY};
use crate::error::{FlowExprError, Result};
use crate::value::{DataType, Value};
use crate::widget::{DisplayConfig, ShowOptions, Widget};
use serde_json::{Value as JsonValue, json};

/// 默认结构：空的根对象
fn template_structure() -> JsonValue {
    json!({
        "type": "object",
        "key": "root",
        "sort": 0,
        "title": null,
        "description": null,
        "items": null,
        "value": null,
        "properties": null
    })
}

#[derive(Debug, Clone, Default)]
pub struct FormBuilder {
    aes_key: String,
}

impl FormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加密字段使用的基础密钥
    pub fn with_aes_key(mut self, aes_key: impl Into<String>) -> Self {
        self.aes_key = aes_key.into();
        self
    }

    pub fn build(&self, raw: &JsonValue) -> Result<Option<Form>> {
        NodeBuilder::Form { aes_key: &self.aes_key }.build(raw)
    }

    /// 未提供结构时使用默认结构
    pub fn template(&self, component_id: &str, raw: Option<&JsonValue>) -> Result<Option<Form>> {
        let raw = raw.filter(|r| !is_blank(r)).cloned().unwrap_or_else(template_structure);
        let mut form = self.build(&raw)?;
        if let Some(form) = form.as_mut() {
            form.set_component_id(component_id);
        }
        Ok(form)
    }
}

#[derive(Debug, Clone, Default)]
pub struct WidgetBuilder {
    show_options: Option<ShowOptions>,
}

impl WidgetBuilder {
    pub fn new(show_options: Option<ShowOptions>) -> Self {
        Self { show_options }
    }

    pub fn build(&self, raw: &JsonValue) -> Result<Option<Widget>> {
        let root = NodeBuilder::Widget {
            show_options: self.show_options.as_ref(),
        }
        .build(raw)?;
        Ok(root.map(Widget::new))
    }

    pub fn template(&self, component_id: &str, raw: Option<&JsonValue>) -> Result<Option<Widget>> {
        let raw = raw.filter(|r| !is_blank(r)).cloned().unwrap_or_else(template_structure);
        let mut widget = self.build(&raw)?;
        if let Some(widget) = widget.as_mut() {
            widget.set_component_id(component_id);
        }
        Ok(widget)
    }
}

// ==================== 节点构建 ====================

enum NodeBuilder<'a> {
    Form { aes_key: &'a str },
    Widget { show_options: Option<&'a ShowOptions> },
}

impl NodeBuilder<'_> {
    fn aes_key(&self) -> &str {
        match self {
            Self::Form { aes_key } => aes_key,
            Self::Widget { .. } => "",
        }
    }

    fn build(&self, raw: &JsonValue) -> Result<Option<Form>> {
        if is_blank(raw) {
            return Ok(None);
        }
        let Some(mut root) = self.build_root(raw)? else {
            return Ok(None);
        };
        self.build_children(&mut root, raw)?;
        Ok(Some(root))
    }

    /// 根节点只允许 object 或 array，其他类型视为没有结构
    fn build_root(&self, raw: &JsonValue) -> Result<Option<Form>> {
        let Some(root_type) = str_field(raw, "type")
            .and_then(FormType::make)
            .filter(FormType::is_complex)
        else {
            return Ok(None);
        };

        let mut root = self.new_node(root_type, ROOT_KEY, 0, raw);
        let raw_value = raw.get("value").filter(|v| !is_blank(v));
        if let Some(raw_value) = raw_value {
            let item_type = raw
                .get("items")
                .and_then(|items| str_field(items, "type"))
                .filter(|t| !t.is_empty());
            let value = Value::build(raw_value).map(|value| match item_type {
                Some(item_type) => value.with_data_type(DataType::make(item_type)),
                None => value,
            });
            root.set_value(value, self.aes_key())?;
        }
        Ok(Some(root))
    }

    fn build_children(&self, parent: &mut Form, raw: &JsonValue) -> Result<()> {
        if let Some(raw_items) = raw.get("items").filter(|v| !is_blank(v)) {
            let key = str_field(raw_items, "key").unwrap_or_default();
            let items = self.build_node(raw_items, key, 0)?;
            parent.set_items(items);
        }

        let Some(raw_properties) = raw.get("properties").filter(|v| !is_blank(v)) else {
            return Ok(());
        };
        let mut properties = Vec::new();
        for (sort, (key, raw_property)) in sorted_properties(raw_properties).into_iter().enumerate() {
            let property = self.build_node(raw_property, &key, sort as i64)?;
            properties.push((key, property));
        }
        parent.set_properties(properties);
        Ok(())
    }

    fn build_node(&self, raw: &JsonValue, key: &str, sort: i64) -> Result<Form> {
        let type_name = str_field(raw, "type").unwrap_or_default();
        let form_type = FormType::make(type_name).ok_or_else(|| {
            FlowExprError::validation(format!("[{key}] 不支持的字段类型 {type_name}"))
        })?;

        let mut node = self.new_node(form_type, key, sort, raw);
        let data_type = DataType::make(form_type.as_str());
        let value = raw
            .get("value")
            .and_then(Value::build)
            .map(|v| v.with_data_type(data_type));
        node.set_value(value, self.aes_key())?;

        if let Self::Widget { .. } = self {
            let initial_value = raw
                .get("initial_value")
                .and_then(Value::build)
                .map(|v| v.with_data_type(data_type));
            node.set_initial_value(initial_value);
            node.set_display_config(DisplayConfig::create(raw.get("display_config"))?);
        }

        if form_type.is_complex() {
            self.build_children(&mut node, raw)?;
        }
        Ok(node)
    }

    fn new_node(&self, form_type: FormType, key: &str, sort: i64, raw: &JsonValue) -> Form {
        let node = Form::new(form_type, key, sort)
            .with_title(str_field(raw, "title").unwrap_or_default())
            .with_description(str_field(raw, "description").unwrap_or_default());

        match self {
            Self::Form { .. } => {
                let required: Vec<String> = raw
                    .get("required")
                    .and_then(JsonValue::as_array)
                    .map(|list| {
                        list.iter()
                            .filter_map(|k| match k {
                                JsonValue::String(s) => Some(s.clone()),
                                JsonValue::Number(n) => Some(n.to_string()),
                                _ => None,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let encryption = raw
                    .get("encryption")
                    .and_then(JsonValue::as_bool)
                    .unwrap_or(false);
                let encryption_value = str_field(raw, "encryption_value").map(str::to_string);
                node.with_required(required)
                    .with_encryption(encryption, encryption_value)
            }
            Self::Widget { show_options } => {
                let mut node = node;
                node.set_show_options(show_options.cloned());
                node
            }
        }
    }
}

/// 按 `sort` 排序下级字段
///
/// 未设置 `sort` 的字段取当前游标值，游标为已出现的最大 `sort` 加一。
/// 列表形式的 properties 以下标作为 key。
fn sorted_properties(raw: &JsonValue) -> Vec<(String, &JsonValue)> {
    let entries: Vec<(String, &JsonValue)> = match raw {
        JsonValue::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        JsonValue::Array(list) => list.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
        _ => Vec::new(),
    };

    let mut cursor = 0i64;
    let mut sorted: Vec<(i64, String, &JsonValue)> = entries
        .into_iter()
        .map(|(key, raw_property)| {
            let sort = raw_property.get("sort").and_then(sort_value);
            cursor = sort.unwrap_or(0).max(cursor) + 1;
            (sort.unwrap_or(cursor), key, raw_property)
        })
        .collect();
    sorted.sort_by_key(|(sort, _, _)| *sort);
    sorted.into_iter().map(|(_, key, raw)| (key, raw)).collect()
}

fn sort_value(raw: &JsonValue) -> Option<i64> {
    match raw {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn str_field<'a>(raw: &'a JsonValue, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(JsonValue::as_str)
}

fn is_blank(raw: &JsonValue) -> bool {
    match raw {
        JsonValue::Null => true,
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::Array(list) => list.is_empty(),
        _ => false,
    }
}
