//! 执行集属性与会话类型

use crate::executable::{COMMON_GROUP, ExecutableNames};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 规则类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// 单个表达式，结果即表达式的值
    Expression,
    /// 语句序列，结果取 `return` 的值
    #[default]
    Script,
}

/// 会话类型，目前只支持无状态会话
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSessionType {
    #[default]
    Stateless,
}

/// 执行集属性
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleExecutionSetProperties {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub rule_type: RuleType,

    #[serde(default)]
    pub rule_group: Option<String>,

    /// 为 true 时规则源码中的 `{{name}}` 会被替换为占位符取值
    #[serde(default)]
    pub resolve_placeholders: bool,

    #[serde(default)]
    pub placeholders: BTreeMap<String, String>,

    /// 创建执行集时分组可见的执行代码
    #[serde(default)]
    pub executable_functions: Vec<String>,

    #[serde(default)]
    pub executable_classes: Vec<String>,

    #[serde(default)]
    pub executable_constants: Vec<String>,
}

impl RuleExecutionSetProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_rule_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = rule_type;
        self
    }

    pub fn with_rule_group(mut self, group: impl Into<String>) -> Self {
        self.rule_group = Some(group.into());
        self
    }

    pub fn with_resolve_placeholders(mut self, resolve: bool) -> Self {
        self.resolve_placeholders = resolve;
        self
    }

    pub fn with_placeholder(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(name.into(), value.into());
        self
    }

    /// 生效的分组，未设置时为公共分组
    pub fn group(&self) -> &str {
        self.rule_group.as_deref().unwrap_or(COMMON_GROUP)
    }

    pub(crate) fn set_executables(&mut self, names: ExecutableNames) {
        self.executable_functions = names.functions;
        self.executable_classes = names.classes;
        self.executable_constants = names.constants;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_rule_type_is_script() {
        let properties = RuleExecutionSetProperties::new();
        assert_eq!(properties.rule_type, RuleType::Script);
        assert_eq!(properties.group(), COMMON_GROUP);
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let properties: RuleExecutionSetProperties = serde_json::from_value(json!({
            "name": "add-rule",
            "rule_type": "expression",
            "placeholders": {"x": "1"}
        }))
        .unwrap();

        assert_eq!(properties.name.as_deref(), Some("add-rule"));
        assert_eq!(properties.rule_type, RuleType::Expression);
        assert_eq!(properties.placeholders.get("x").map(String::as_str), Some("1"));
        assert!(!properties.resolve_placeholders);
    }
}
