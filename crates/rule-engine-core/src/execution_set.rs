//! 规则执行集
//!
//! 执行集由有序的规则源码与属性组成，创建时即编译为语法树并缓存，
//! 需要占位符而取值尚未提供时推迟到创建会话时编译。

use crate::error::{Result, RuleError};
use crate::executable::ExecutableRegistry;
use crate::properties::{RuleExecutionSetProperties, RuleType};
use crate::sandbox::ast::Program;
use crate::sandbox::{CallableScope, Sandbox};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap());

#[derive(Debug, Clone)]
pub struct RuleExecutionSet {
    rules: Vec<String>,
    properties: RuleExecutionSetProperties,
    asts: Arc<Vec<Program>>,
}

impl RuleExecutionSet {
    pub fn name(&self) -> Option<&str> {
        self.properties.name.as_deref()
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    pub fn properties(&self) -> &RuleExecutionSetProperties {
        &self.properties
    }

    pub fn rule_group(&self) -> &str {
        self.properties.group()
    }

    /// 已缓存的语法树，编译被推迟时为空
    pub fn asts(&self) -> &[Program] {
        &self.asts
    }

    pub(crate) fn shared_asts(&self) -> Arc<Vec<Program>> {
        Arc::clone(&self.asts)
    }

    /// 编译被推迟到会话创建时
    pub fn is_deferred(&self) -> bool {
        self.asts.is_empty() && !self.rules.is_empty()
    }

    /// 可序列化的快照，只包含源码与属性
    pub fn snapshot(&self) -> ExecutionSetSnapshot {
        ExecutionSetSnapshot {
            rules: self.rules.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// 外部缓存中保存的执行集内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSetSnapshot {
    pub rules: Vec<String>,
    pub properties: RuleExecutionSetProperties,
}

/// 执行集工厂
#[derive(Clone)]
pub struct RuleExecutionSetProvider {
    registry: ExecutableRegistry,
    sandbox: Sandbox,
}

impl RuleExecutionSetProvider {
    pub fn new(registry: ExecutableRegistry, sandbox: Sandbox) -> Self {
        Self { registry, sandbox }
    }

    /// 由规则源码创建执行集
    #[instrument(skip(self, rules, properties), fields(name = ?properties.name, group = %properties.group()))]
    pub fn create_rule_execution_set(
        &self,
        rules: Vec<String>,
        mut properties: RuleExecutionSetProperties,
    ) -> Result<RuleExecutionSet> {
        let group = properties.group().to_string();
        properties.set_executables(self.registry.names(&group));

        let deferred =
            properties.resolve_placeholders && !placeholders_bound(&rules, &properties.placeholders);
        let asts = if deferred {
            debug!("占位符取值缺失，推迟编译");
            Vec::new()
        } else {
            let scope = self.registry.scope(&group);
            compile_rules(&self.sandbox, &rules, &properties, &properties.placeholders, &scope)?
        };

        Ok(RuleExecutionSet {
            rules,
            properties,
            asts: Arc::new(asts),
        })
    }

    /// 由缓存快照重建执行集
    pub fn restore(&self, snapshot: ExecutionSetSnapshot) -> Result<RuleExecutionSet> {
        self.create_rule_execution_set(snapshot.rules, snapshot.properties)
    }
}

/// 编译全部规则，`placeholders` 在需要解析占位符时使用
pub(crate) fn compile_rules(
    sandbox: &Sandbox,
    rules: &[String],
    properties: &RuleExecutionSetProperties,
    placeholders: &BTreeMap<String, String>,
    scope: &dyn CallableScope,
) -> Result<Vec<Program>> {
    rules
        .iter()
        .map(|rule| {
            let source = if properties.resolve_placeholders {
                resolve_placeholders(rule, placeholders)?
            } else {
                rule.clone()
            };
            match properties.rule_type {
                RuleType::Expression => sandbox.compile_expression(&source, scope),
                RuleType::Script => sandbox.compile_script(&source, scope),
            }
        })
        .collect()
}

/// 替换源码中的 `{{name}}`
pub fn resolve_placeholders(source: &str, values: &BTreeMap<String, String>) -> Result<String> {
    let mut missing = None;
    let resolved = PLACEHOLDER.replace_all(source, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match values.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(RuleError::PlaceholderMissing(name)),
        None => Ok(resolved.into_owned()),
    }
}

/// 源码中的占位符是否都已有取值
pub fn placeholders_bound(rules: &[String], values: &BTreeMap<String, String>) -> bool {
    rules.iter().all(|rule| {
        PLACEHOLDER
            .captures_iter(rule)
            .all(|caps| values.contains_key(&caps[1]))
    })
}
