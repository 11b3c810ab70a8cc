//! 规则会话

use crate::error::Result;
use crate::executable::GroupScope;
use crate::execution_set::RuleExecutionSet;
use crate::sandbox::Sandbox;
use crate::sandbox::ast::Program;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// 无状态会话
///
/// 每次 `execute_rules` 都是一次独立的输入到输出求值，会话本身不保存状态。
/// 使用完毕后必须调用 [`release`](Self::release)。
pub struct StatelessRuleSession {
    id: Uuid,
    bind_uri: String,
    set: Arc<RuleExecutionSet>,
    asts: Arc<Vec<Program>>,
    scope: GroupScope,
    sandbox: Sandbox,
    released: bool,
}

impl StatelessRuleSession {
    pub(crate) fn new(
        bind_uri: &str,
        set: Arc<RuleExecutionSet>,
        asts: Arc<Vec<Program>>,
        scope: GroupScope,
        sandbox: Sandbox,
    ) -> Self {
        let id = Uuid::now_v7();
        debug!(session_id = %id, "规则会话已创建: {}", bind_uri);
        Self {
            id,
            bind_uri: bind_uri.to_string(),
            set,
            asts,
            scope,
            sandbox,
            released: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bind_uri(&self) -> &str {
        &self.bind_uri
    }

    pub fn execution_set(&self) -> &RuleExecutionSet {
        &self.set
    }

    /// 本会话使用的语法树
    pub fn asts(&self) -> &[Program] {
        &self.asts
    }

    /// 依次执行每条规则，结果与规则源码一一对应
    pub fn execute_rules(&self, inputs: &Map<String, Value>) -> Result<Vec<Value>> {
        metrics::counter!("rule_executions_total", "group" => self.scope.group().to_string())
            .increment(1);

        self.asts
            .iter()
            .map(|program| self.sandbox.execute(program, inputs, &self.scope))
            .collect()
    }

    /// 释放会话
    pub fn release(mut self) {
        self.released = true;
        debug!(session_id = %self.id, "规则会话已释放: {}", self.bind_uri);
    }
}

impl Drop for StatelessRuleSession {
    fn drop(&mut self) {
        if !self.released {
            warn!(session_id = %self.id, "规则会话未释放: {}", self.bind_uri);
        }
    }
}
