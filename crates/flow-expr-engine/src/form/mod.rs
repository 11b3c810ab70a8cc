//! 表单
//!
//! 采用 json-schema 风格的树形结构：
//! - `object` 的 `properties` 是下级字段
//! - `array` 的 `items` 描述元素结构，`properties` 保存已填写的元素
//! - 基础类型（string / number / integer / boolean / expression）通过 `value` 取值
//!
//! 复杂类型也可以设置 `value`，但只接受以字段引用开头的表达式。
//! 基础类型可开启字段加密，加密后只保留 `encryption_value`。

pub mod builder;

use crate::context::EngineContext;
use crate::error::{FlowExprError, Result};
use crate::expression::ExpressionItem;
use crate::value::{DataType, Value};
use crate::widget::{DisplayConfig, ShowOptions};
use flow_shared::crypto::FieldEncryptor;
use rule_engine_core::sandbox::ops;
use serde_json::{Map, Value as JsonValue, json};
use tracing::debug;

pub use builder::{FormBuilder, WidgetBuilder};

pub const ROOT_KEY: &str = "__ROOT__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Expression,
}

impl FormType {
    pub fn make(value: &str) -> Option<Self> {
        let form_type = match value {
            "object" => Self::Object,
            "array" => Self::Array,
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "expression" => Self::Expression,
            _ => return None,
        };
        Some(form_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Expression => "expression",
        }
    }

    pub fn is_object(&self) -> bool {
        *self == Self::Object
    }

    pub fn is_array(&self) -> bool {
        *self == Self::Array
    }

    pub fn is_complex(&self) -> bool {
        self.is_object() || self.is_array()
    }

    pub fn is_basic(&self) -> bool {
        !self.is_complex()
    }
}

/// 表单节点
///
/// 控件树复用同一结构，`display_config` / `initial_value` / `show_options` 只在控件中出现。
#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    form_type: FormType,
    key: String,
    sort: i64,
    title: Option<String>,
    description: Option<String>,
    required: Option<Vec<String>>,
    properties: Option<Vec<(String, Form)>>,
    items: Option<Box<Form>>,
    value: Option<Value>,
    encryption: bool,
    encryption_value: Option<String>,
    complex_value: Option<JsonValue>,
    component_id: Option<String>,
    display_config: Option<DisplayConfig>,
    initial_value: Option<Value>,
    show_options: Option<ShowOptions>,
}

impl Form {
    pub fn new(form_type: FormType, key: impl Into<String>, sort: i64) -> Self {
        Self {
            form_type,
            key: key.into(),
            sort,
            title: None,
            description: None,
            required: form_type.is_object().then(Vec::new),
            properties: None,
            items: None,
            value: None,
            encryption: false,
            encryption_value: None,
            complex_value: None,
            component_id: None,
            display_config: None,
            initial_value: None,
            show_options: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 只有 object 有必填列表
    pub fn with_required(mut self, required: Vec<String>) -> Self {
        if self.form_type.is_object() {
            self.required = Some(required);
        }
        self
    }

    /// 只有基础类型支持加密
    pub fn with_encryption(mut self, encryption: bool, encryption_value: Option<String>) -> Self {
        if self.form_type.is_basic() {
            self.encryption = encryption;
            self.encryption_value = encryption_value;
        }
        self
    }

    // ==================== 访问 ====================

    pub fn is_root(&self) -> bool {
        self.key == ROOT_KEY
    }

    pub fn form_type(&self) -> FormType {
        self.form_type
    }

    /// 根节点返回 `root`
    pub fn key(&self) -> &str {
        if self.is_root() { "root" } else { &self.key }
    }

    pub fn sort(&self) -> i64 {
        self.sort
    }

    pub fn set_sort(&mut self, sort: i64) {
        self.sort = sort;
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn required(&self) -> Option<&[String]> {
        self.required.as_deref()
    }

    pub fn properties(&self) -> Option<&[(String, Form)]> {
        self.properties.as_deref()
    }

    pub fn property(&self, key: &str) -> Option<&Form> {
        self.properties()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, property)| property)
    }

    pub fn property_mut(&mut self, key: &str) -> Option<&mut Form> {
        self.properties
            .as_mut()?
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, property)| property)
    }

    /// 只有复杂类型才有下级节点，空列表忽略
    pub fn set_properties(&mut self, properties: Vec<(String, Form)>) {
        if !properties.is_empty() && self.form_type.is_complex() {
            self.properties = Some(properties);
        }
    }

    pub fn items(&self) -> Option<&Form> {
        self.items.as_deref()
    }

    /// 只有 array 才有 items
    pub fn set_items(&mut self, items: Form) {
        if self.form_type.is_array() {
            self.items = Some(Box::new(items));
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn encryption(&self) -> bool {
        self.encryption
    }

    pub fn encryption_value(&self) -> Option<&str> {
        self.encryption_value.as_deref()
    }

    pub fn complex_value(&self) -> Option<&JsonValue> {
        self.complex_value.as_ref()
    }

    pub fn set_complex_value(&mut self, complex_value: Option<JsonValue>) {
        self.complex_value = complex_value;
    }

    pub fn component_id(&self) -> Option<&str> {
        self.component_id.as_deref()
    }

    pub fn set_component_id(&mut self, component_id: impl Into<String>) {
        self.component_id = Some(component_id.into());
    }

    pub fn display_config(&self) -> Option<&DisplayConfig> {
        self.display_config.as_ref()
    }

    pub fn set_display_config(&mut self, display_config: Option<DisplayConfig>) {
        self.display_config = display_config;
    }

    pub fn initial_value(&self) -> Option<&Value> {
        self.initial_value.as_ref()
    }

    pub fn set_initial_value(&mut self, initial_value: Option<Value>) {
        self.initial_value = initial_value;
    }

    pub fn set_show_options(&mut self, show_options: Option<ShowOptions>) {
        self.show_options = show_options;
    }

    /// 对外展示的值，脱敏控件在开启脱敏时返回掩码
    pub fn shown_value(&self) -> Option<Value> {
        let value = self.value.as_ref()?;
        if let (Some(config), Some(options)) = (&self.display_config, &self.show_options)
            && config.is_desensitization()
            && options.is_desensitization()
        {
            return Value::build_const(options.mask());
        }
        Some(value.clone())
    }

    /// 设置值
    ///
    /// 复杂类型只接受以字段引用开头的表达式；开启加密时明文值会被加密并清空。
    pub fn set_value(&mut self, value: Option<Value>, aes_key: &str) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        if self.form_type.is_complex() {
            if !value.is_expression() {
                return Err(FlowExprError::validation(format!(
                    "[{}] 使用表达式来作为数组或对象的值，只允许传入表达式",
                    self.key()
                )));
            }
            if !value.expression_is_only_fields("") {
                return Err(FlowExprError::validation(format!(
                    "[{}] 使用表达式来作为数组或对象的值，必须以表达式开头",
                    self.key()
                )));
            }
        }
        self.value = Some(value);
        self.encrypt(aes_key)
    }

    fn encrypt(&mut self, aes_key: &str) -> Result<()> {
        if !self.encryption {
            self.encryption_value = None;
            return Ok(());
        }
        let Some(value) = &self.value else {
            return Ok(());
        };
        let encryptor = FieldEncryptor::for_field(aes_key, &self.key)?;
        self.encryption_value = Some(encryptor.encrypt_json(&value.to_json())?);
        self.value = None;
        Ok(())
    }

    /// 实际参与运算的值：加密值解密后使用，否则取 `value`，再取 `initial_value`
    pub fn execute_value(&self, aes_key: &str) -> Result<Option<Value>> {
        if self.encryption
            && let Some(cipher) = &self.encryption_value
        {
            let encryptor = FieldEncryptor::for_field(aes_key, &self.key)?;
            let raw = encryptor.decrypt_json(cipher)?;
            if let Some(value) = Value::build(&raw) {
                return Ok(Some(value.with_data_type(DataType::make(self.form_type.as_str()))));
            }
        }
        Ok(self.value.clone().or_else(|| self.initial_value.clone()))
    }

    pub fn all_field_items(&self, aes_key: &str) -> Result<Vec<ExpressionItem>> {
        let mut items = Vec::new();
        for (_, property) in self.properties().unwrap_or_default() {
            items.extend(property.all_field_items(aes_key)?);
        }
        if let Some(value) = self.execute_value(aes_key)? {
            items.extend(value.all_field_items().into_iter().cloned());
        }
        Ok(items)
    }

    // ==================== 序列化 ====================

    pub fn to_json(&self) -> JsonValue {
        json!({
            "type": self.form_type.as_str(),
            "key": self.key(),
            "sort": self.sort,
            "title": self.title,
            "description": self.description,
            "required": self.required,
            "value": self.value.as_ref().map(Value::to_json),
            "encryption": self.encryption,
            "encryption_value": self.encryption_value,
            "items": self.items().map(Form::to_json),
            "properties": self.properties_json(Form::to_json),
        })
    }

    /// array 的元素序列化为列表，object 的下级字段序列化为对象
    fn properties_json(&self, f: impl Fn(&Form) -> JsonValue) -> Option<JsonValue> {
        let properties = self.properties()?;
        if self.form_type.is_array() {
            return Some(JsonValue::Array(properties.iter().map(|(_, p)| f(p)).collect()));
        }
        let map: Map<String, JsonValue> = properties
            .iter()
            .map(|(key, p)| (key.clone(), f(p)))
            .collect();
        Some(JsonValue::Object(map))
    }

    pub fn to_json_schema(&self) -> JsonValue {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.form_type.as_str()));
        schema.insert(
            "required".to_string(),
            json!(self.required.clone().unwrap_or_default()),
        );
        if let Some(description) = &self.description {
            schema.insert("description".to_string(), json!(description));
        }
        if self.form_type.is_object() {
            schema.insert(
                "properties".to_string(),
                self.properties_json(Form::to_json_schema)
                    .unwrap_or(JsonValue::Null),
            );
        }
        if self.form_type.is_array() {
            schema.insert(
                "items".to_string(),
                self.items()
                    .map(Form::to_json_schema)
                    .unwrap_or(JsonValue::Null),
            );
        }
        JsonValue::Object(schema)
    }

    // ==================== 取值 ====================

    /// 按结构计算键值数据
    ///
    /// 前面字段的结果会以 `{prefix}.{key}` 写回数据源，供后面字段的表达式引用。
    /// `prefix` 为空时使用组件 ID；`check` 时校验必填项。
    pub fn key_value(
        &self,
        ctx: &EngineContext,
        source: &JsonValue,
        check: bool,
        prefix: &str,
        exec: bool,
    ) -> Result<JsonValue> {
        let prefix = if prefix.is_empty() {
            self.component_id.clone().unwrap_or_default()
        } else {
            prefix.to_string()
        };
        let execute_value = self.execute_value(ctx.aes_key())?;

        match self.form_type {
            FormType::Object => {
                if let Some(value) = &execute_value {
                    return value_result(ctx, value, source, exec, self.key());
                }
                let mut source = source.clone();
                let mut output = Map::new();
                let required = self.required().unwrap_or_default();
                for (key, property) in self.properties().unwrap_or_default() {
                    let source_key = format!("{prefix}.{key}");
                    if property.form_type.is_complex() {
                        let value = match &property.complex_value {
                            Some(complex_value) => complex_value.clone(),
                            None => property.key_value(ctx, &source, check, &source_key, exec)?,
                        };
                        output.insert(key.clone(), value);
                        continue;
                    }

                    let mut exists = false;
                    if let Some(value) = property.execute_value(ctx.aes_key())? {
                        let result = value_result(ctx, &value, &source, exec, property.key())?;
                        exists = !(value.is_old_const_value() && result.is_null());
                        set_path(&mut source, &source_key, result.clone());
                        output.insert(key.clone(), result);
                    }
                    if check && required.contains(key) && !exists {
                        return Err(FlowExprError::mismatch(format!(
                            "[{key}]{} 不能为空",
                            property.title().unwrap_or_default()
                        )));
                    }
                    output.entry(key.clone()).or_insert(JsonValue::Null);
                }
                Ok(JsonValue::Object(output))
            }
            FormType::Array => {
                if let Some(value) = &execute_value {
                    return value_result(ctx, value, source, exec, self.key());
                }
                let mut list = Vec::new();
                for (i, (_, property)) in self.properties().unwrap_or_default().iter().enumerate() {
                    let element_prefix = format!("{prefix}.{i}");
                    list.push(property.key_value(ctx, source, check, &element_prefix, exec)?);
                }
                Ok(JsonValue::Array(list))
            }
            _ => match &execute_value {
                Some(value) => value_result(ctx, value, source, exec, self.key()),
                None => Ok(JsonValue::Null),
            },
        }
    }

    /// 以标题为键的预览数据，标题重复时追加 `_copy`
    pub fn title_value(&self, input: &JsonValue) -> Result<JsonValue> {
        match self.form_type {
            FormType::Object => {
                let mut preview = Map::new();
                for (key, property) in self.properties().unwrap_or_default() {
                    let mut title = property
                        .title()
                        .filter(|t| !t.is_empty())
                        .unwrap_or(key)
                        .to_string();
                    while preview.contains_key(&title) {
                        title.push_str("_copy");
                    }
                    let next = child(input, key).filter(|v| !v.is_null());
                    let value = if property.form_type.is_complex() {
                        let next = next.cloned().unwrap_or_else(|| json!([]));
                        if !is_array_like(&next) {
                            return Err(FlowExprError::mismatch(format!("[{key}] type error")));
                        }
                        if property.properties().is_some() {
                            property.title_value(&next)?
                        } else {
                            next
                        }
                    } else {
                        next.cloned().unwrap_or(JsonValue::Null)
                    };
                    preview.insert(title, value);
                }
                Ok(JsonValue::Object(preview))
            }
            FormType::Array => {
                let Some(items) = self.items().filter(|i| i.form_type.is_complex()) else {
                    return Ok(input.clone());
                };
                let mut preview = Vec::new();
                for element in elements(input) {
                    if !element.is_null() && !is_array_like(element) {
                        return Err(FlowExprError::mismatch(format!("[{}] type error", self.key())));
                    }
                    preview.push(items.title_value(element)?);
                }
                Ok(JsonValue::Array(preview))
            }
            _ => Ok(JsonValue::Object(Map::new())),
        }
    }

    /// 把一份数据作为固定值写入结构
    ///
    /// object 逐个字段写入；array 按数据生成元素节点，未定义 `items` 时按字符串处理。
    pub fn append_const_value(&mut self, input: &JsonValue, aes_key: &str) -> Result<()> {
        if !is_array_like(input) || ops::is_absent(input) {
            return Ok(());
        }

        if self.form_type.is_object() {
            let empty = json!([]);
            for (key, property) in self.properties.iter_mut().flatten() {
                let next = child(input, key).filter(|v| !v.is_null());
                if property.form_type.is_complex() {
                    if property.properties.is_some() {
                        property.append_const_value(next.unwrap_or(&empty), aes_key)?;
                    } else if let Some(next) = next {
                        if !is_array_like(next) {
                            return Err(FlowExprError::mismatch(format!("[{key}] type error")));
                        }
                        property.set_complex_value(Some(next.clone()));
                    }
                } else if let Some(next) = next
                    && property.check_input_type(next)
                {
                    property.set_value(Value::build_const(next.clone()), aes_key)?;
                }
            }
        }

        if self.form_type.is_array() {
            let items: Form = (**self.items.get_or_insert_with(|| {
                Box::new(Form::new(FormType::String, "items", 0).with_title("items"))
            }))
            .clone();
            let mut properties = Vec::new();
            for (i, element) in elements(input).enumerate() {
                let mut property = items.clone();
                if items.form_type.is_complex() {
                    property.append_const_value(element, aes_key)?;
                } else {
                    property.set_value(Value::build_const(element.clone()), aes_key)?;
                    property.set_sort(i as i64);
                }
                properties.push((i.to_string(), property));
            }
            debug!(key = %self.key(), count = properties.len(), "写入数组固定值");
            self.set_properties(properties);
        }
        Ok(())
    }

    /// 检测数据是否符合结构，`check` 时不符合直接返回错误
    pub fn is_match(&self, input: &JsonValue, check: bool) -> Result<bool> {
        let reject = |message: String| {
            if check {
                Err(FlowExprError::mismatch(message))
            } else {
                Ok(false)
            }
        };

        if self.form_type.is_object() {
            let required = self.required().unwrap_or_default();
            for (key, property) in self.properties().unwrap_or_default() {
                let next = child(input, key).filter(|v| !v.is_null());
                if required.contains(key) && next.is_none() {
                    return reject(format!("{key} is required"));
                }
                if property.form_type.is_complex() {
                    let next = next.cloned().unwrap_or_else(|| json!([]));
                    if !is_array_like(&next) {
                        return reject(format!("{key} type error"));
                    }
                    if !property.is_match(&next, check)? {
                        return Ok(false);
                    }
                } else if let Some(next) = next
                    && !property.check_input_type(next)
                {
                    return reject(format!("{key} type error"));
                }
            }
        }

        if self.form_type.is_array()
            && let Some(items) = self.items().filter(|i| i.form_type.is_complex())
        {
            for (i, element) in elements(input).enumerate() {
                let element = if element.is_null() { json!([]) } else { element.clone() };
                if !is_array_like(&element) {
                    return reject(format!(
                        "[{}]的item[{i}] type only array, but {} given",
                        self.key(),
                        ops::type_name(&element)
                    ));
                }
                if !items.is_match(&element, check)? {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// 平铺的 `key → title` 列表，数组元素以 `[0]` 表示
    pub fn tile_list(&self, key_prefix: &str, title_prefix: &str) -> Vec<(String, String)> {
        let join = |prefix: &str, name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}.{name}")
            }
        };
        let mut list = Vec::new();

        if self.form_type.is_object() {
            for (key, property) in self.properties().unwrap_or_default() {
                let new_key = join(key_prefix, key);
                let title = property.title().filter(|t| !t.is_empty()).unwrap_or(key);
                let new_title = join(title_prefix, title);
                list.push((new_key.clone(), new_title.clone()));
                if property.form_type.is_object() {
                    list.extend(property.tile_list(&new_key, &new_title));
                }
                if property.form_type.is_array()
                    && let Some(items) = property.items()
                {
                    list.extend(items.tile_list(&format!("{new_key}[0]"), &format!("{new_title}[0]")));
                }
            }
        }

        if self.form_type.is_array() {
            let new_key = join(key_prefix, self.key());
            let title = self.title().filter(|t| !t.is_empty()).unwrap_or(self.key());
            let new_title = join(title_prefix, title);
            list.push((new_key.clone(), new_title.clone()));
            if let Some(items) = self.items().filter(|i| i.form_type.is_complex()) {
                list.extend(items.tile_list(&format!("{new_key}[0]"), &format!("{new_title}[0]")));
            }
        }

        list
    }

    pub fn check_input_type(&self, input: &JsonValue) -> bool {
        match self.form_type {
            FormType::String => input.is_string() || input.is_number(),
            FormType::Number => ops::is_numeric(input),
            FormType::Boolean => input.is_boolean(),
            FormType::Object | FormType::Array => is_array_like(input),
            FormType::Integer => input.is_i64() || input.is_u64(),
            FormType::Expression => true,
        }
    }
}

fn value_result(
    ctx: &EngineContext,
    value: &Value,
    source: &JsonValue,
    exec: bool,
    label: &str,
) -> Result<JsonValue> {
    Ok(value
        .result(ctx, source, true, exec, label)?
        .unwrap_or(JsonValue::Null))
}

fn is_array_like(value: &JsonValue) -> bool {
    value.is_array() || value.is_object()
}

/// 按键取下级数据，列表按下标取
fn child<'a>(input: &'a JsonValue, key: &str) -> Option<&'a JsonValue> {
    match input {
        JsonValue::Object(map) => map.get(key),
        JsonValue::Array(list) => key.parse::<usize>().ok().and_then(|i| list.get(i)),
        _ => None,
    }
}

fn elements(input: &JsonValue) -> Box<dyn Iterator<Item = &JsonValue> + '_> {
    match input {
        JsonValue::Array(list) => Box::new(list.iter()),
        JsonValue::Object(map) => Box::new(map.values()),
        _ => Box::new(std::iter::empty()),
    }
}

/// 按 `a.b.c` 路径写入，中间节点不是对象时替换为对象
fn set_path(target: &mut JsonValue, path: &str, value: JsonValue) {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = target;
    for segment in parents {
        if !current.is_object() {
            *current = JsonValue::Object(Map::new());
        }
        let JsonValue::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }
    if !current.is_object() {
        *current = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(map) = current {
        map.insert(last.to_string(), value);
    }
}
