//! 组件
//!
//! 组件是 `{id, version, type, structure}` 的外壳。结构先以原始 JSON 保存，
//! 第一次访问时按类型构建；未提供结构时使用对应构建器的默认模板。

use crate::condition::{Condition, ConditionBuilder};
use crate::error::{FlowExprError, Result};
use crate::expression::{Expression, ExpressionBuilder};
use crate::form::{Form, FormBuilder, WidgetBuilder};
use crate::value::Value;
use crate::widget::{ShowOptions, Widget};
use serde_json::{Value as JsonValue, json};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureType {
    Expression,
    Value,
    Condition,
    Form,
    Widget,
}

impl StructureType {
    pub fn make(value: &str) -> Option<Self> {
        let structure_type = match value {
            "expression" => Self::Expression,
            "value" => Self::Value,
            "condition" => Self::Condition,
            "form" => Self::Form,
            "widget" => Self::Widget,
            _ => return None,
        };
        Some(structure_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expression => "expression",
            Self::Value => "value",
            Self::Condition => "condition",
            Self::Form => "form",
            Self::Widget => "widget",
        }
    }

    /// 错误消息中使用的名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Expression => "Expression",
            Self::Value => "Value",
            Self::Condition => "Condition",
            Self::Form => "Form",
            Self::Widget => "Widget",
        }
    }
}

/// 已构建的结构
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    Expression(Expression),
    Value(Value),
    Condition(Condition),
    Form(Form),
    Widget(Widget),
}

impl Structure {
    pub fn structure_type(&self) -> StructureType {
        match self {
            Self::Expression(_) => StructureType::Expression,
            Self::Value(_) => StructureType::Value,
            Self::Condition(_) => StructureType::Condition,
            Self::Form(_) => StructureType::Form,
            Self::Widget(_) => StructureType::Widget,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Expression(expression) => expression.to_json(),
            Self::Value(value) => value.to_json(),
            Self::Condition(condition) => condition.to_json(),
            Self::Form(form) => form.to_json(),
            Self::Widget(widget) => widget.to_json(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum StructureCell {
    Raw(JsonValue),
    Built(Option<Structure>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    id: String,
    version: String,
    structure_type: StructureType,
    cell: StructureCell,
    aes_key: String,
    show_options: Option<ShowOptions>,
}

impl Component {
    /// 新建空组件，结构在访问时按默认模板生成
    pub fn new(structure_type: StructureType) -> Self {
        Self {
            id: format!("component-{}", Uuid::new_v4().simple()),
            version: DEFAULT_VERSION.to_string(),
            structure_type,
            cell: StructureCell::Built(None),
            aes_key: String::new(),
            show_options: None,
        }
    }

    /// 由 `{id, version, type, structure}` 创建，结构延迟到首次访问时构建
    pub fn fast_create(raw: &JsonValue) -> Result<Option<Self>> {
        let Some(map) = raw.as_object().filter(|m| !m.is_empty()) else {
            return Ok(None);
        };
        let type_name = map.get("type").and_then(JsonValue::as_str).unwrap_or_default();
        let structure_type = StructureType::make(type_name)
            .ok_or_else(|| FlowExprError::validation(format!("不支持的组件类型 {type_name}")))?;

        let mut component = Self::new(structure_type);
        if let Some(id) = map.get("id").and_then(JsonValue::as_str).filter(|id| !id.is_empty()) {
            component.id = id.to_string();
        }
        if let Some(version) = map.get("version").and_then(JsonValue::as_str) {
            component.version = version.to_string();
        }
        component.cell = StructureCell::Raw(map.get("structure").cloned().unwrap_or(JsonValue::Null));
        Ok(Some(component))
    }

    /// 用已构建的结构创建
    pub fn from_structure(id: impl Into<String>, structure: Structure) -> Self {
        let mut component = Self::new(structure.structure_type());
        component.id = id.into();
        component.cell = StructureCell::Built(Some(structure));
        component.attach_id();
        component
    }

    /// 表单加密字段使用的基础密钥，需在构建前设置
    pub fn with_aes_key(mut self, aes_key: impl Into<String>) -> Self {
        self.aes_key = aes_key.into();
        self
    }

    /// 控件的展示选项，需在构建前设置
    pub fn with_show_options(mut self, show_options: ShowOptions) -> Self {
        self.show_options = Some(show_options);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn structure_type(&self) -> StructureType {
        self.structure_type
    }

    pub fn is_built(&self) -> bool {
        matches!(self.cell, StructureCell::Built(_))
    }

    /// 原始结构按类型构建，只发生一次
    pub fn ensure_built(&mut self) -> Result<()> {
        let StructureCell::Raw(raw) = &self.cell else {
            return Ok(());
        };
        let structure = self.build_structure(raw)?;
        debug!(
            component_id = %self.id,
            structure_type = self.structure_type.as_str(),
            "组件结构已构建"
        );
        self.cell = StructureCell::Built(structure);
        self.attach_id();
        Ok(())
    }

    pub fn structure(&mut self) -> Result<Option<&Structure>> {
        self.ensure_built()?;
        match &self.cell {
            StructureCell::Built(structure) => Ok(structure.as_ref()),
            StructureCell::Raw(_) => Ok(None),
        }
    }

    pub fn expression(&mut self) -> Result<&Expression> {
        match self.specific(StructureType::Expression)? {
            Structure::Expression(expression) => Ok(expression),
            _ => Err(Self::not_a(StructureType::Expression)),
        }
    }

    pub fn value(&mut self) -> Result<&Value> {
        match self.specific(StructureType::Value)? {
            Structure::Value(value) => Ok(value),
            _ => Err(Self::not_a(StructureType::Value)),
        }
    }

    pub fn condition(&mut self) -> Result<&Condition> {
        match self.specific(StructureType::Condition)? {
            Structure::Condition(condition) => Ok(condition),
            _ => Err(Self::not_a(StructureType::Condition)),
        }
    }

    pub fn form(&mut self) -> Result<&Form> {
        match self.specific(StructureType::Form)? {
            Structure::Form(form) => Ok(form),
            _ => Err(Self::not_a(StructureType::Form)),
        }
    }

    pub fn form_mut(&mut self) -> Result<&mut Form> {
        self.specific(StructureType::Form)?;
        match &mut self.cell {
            StructureCell::Built(Some(Structure::Form(form))) => Ok(form),
            _ => Err(Self::not_a(StructureType::Form)),
        }
    }

    pub fn widget(&mut self) -> Result<&Widget> {
        match self.specific(StructureType::Widget)? {
            Structure::Widget(widget) => Ok(widget),
            _ => Err(Self::not_a(StructureType::Widget)),
        }
    }

    pub fn widget_mut(&mut self) -> Result<&mut Widget> {
        self.specific(StructureType::Widget)?;
        match &mut self.cell {
            StructureCell::Built(Some(Structure::Widget(widget))) => Ok(widget),
            _ => Err(Self::not_a(StructureType::Widget)),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let structure = match &self.cell {
            StructureCell::Raw(raw) => raw.clone(),
            StructureCell::Built(Some(structure)) => structure.to_json(),
            StructureCell::Built(None) => JsonValue::Null,
        };
        json!({
            "id": self.id,
            "version": self.version,
            "type": self.structure_type.as_str(),
            "structure": structure,
        })
    }

    // ==================== 内部 ====================

    /// 类型匹配后返回已构建的结构，为空时生成默认模板
    fn specific(&mut self, expected: StructureType) -> Result<&Structure> {
        if self.structure_type != expected {
            return Err(FlowExprError::validation(format!(
                "Component is not {}",
                expected.name()
            )));
        }
        self.ensure_built()?;
        if matches!(self.cell, StructureCell::Built(None)) {
            let template = self.template()?;
            self.cell = StructureCell::Built(template);
            self.attach_id();
        }
        match &self.cell {
            StructureCell::Built(Some(structure)) => Ok(structure),
            _ => Err(Self::not_a(expected)),
        }
    }

    fn not_a(expected: StructureType) -> FlowExprError {
        FlowExprError::validation(format!("Component is not {}.", expected.name()))
    }

    fn build_structure(&self, raw: &JsonValue) -> Result<Option<Structure>> {
        let structure = match self.structure_type {
            StructureType::Expression => ExpressionBuilder::new().build(raw).map(Structure::Expression),
            StructureType::Value => Value::build(raw).map(Structure::Value),
            StructureType::Condition => ConditionBuilder::new().build(raw)?.map(Structure::Condition),
            StructureType::Form => self.form_builder().build(raw)?.map(Structure::Form),
            StructureType::Widget => self.widget_builder().build(raw)?.map(Structure::Widget),
        };
        Ok(structure)
    }

    fn template(&self) -> Result<Option<Structure>> {
        let structure = match self.structure_type {
            StructureType::Form => self.form_builder().template(&self.id, None)?.map(Structure::Form),
            StructureType::Widget => self
                .widget_builder()
                .template(&self.id, None)?
                .map(Structure::Widget),
            StructureType::Condition => ConditionBuilder::new()
                .template(None)?
                .map(Structure::Condition),
            StructureType::Expression | StructureType::Value => None,
        };
        Ok(structure)
    }

    fn form_builder(&self) -> FormBuilder {
        FormBuilder::new().with_aes_key(self.aes_key.clone())
    }

    fn widget_builder(&self) -> WidgetBuilder {
        WidgetBuilder::new(self.show_options.clone())
    }

    /// 表单与控件记录所属组件，取值时作为默认前缀
    fn attach_id(&mut self) {
        let id = self.id.clone();
        match &mut self.cell {
            StructureCell::Built(Some(Structure::Form(form))) => form.set_component_id(id),
            StructureCell::Built(Some(Structure::Widget(widget))) => widget.set_component_id(id),
            _ => {}
        }
    }
}
