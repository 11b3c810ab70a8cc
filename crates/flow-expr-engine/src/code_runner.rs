//! 生成代码的编译与执行
//!
//! 模型层只负责生成代码字符串，真正的编译与求值通过 [`CodeRunner`] 交给规则引擎。

use crate::error::{FlowExprError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use rule_engine_core::{
    RuleError, RuleExecutionSetProperties, RuleServiceProvider, RuleSessionType, RuleType,
    SandboxRuleServiceProvider,
};
use serde_json::{Map, Value as JsonValue, json};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// 表达式执行集所在的规则分组
pub const EXPRESSION_RULE_GROUP: &str = "flow_expr_engine";

/// 默认最多保留的已编译代码数
pub const DEFAULT_COMPILE_CACHE_SIZE: usize = 1024;

/// 已编译的代码，持有注册到规则引擎中的执行集地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCode {
    pub bind_uri: String,
    pub code: String,
}

#[cfg_attr(test, mockall::automock)]
pub trait CodeRunner: Send + Sync {
    fn compile(&self, code: &str) -> Result<CompiledCode>;

    fn execute(&self, compiled: &CompiledCode, inputs: &Map<String, JsonValue>) -> Result<JsonValue>;
}

/// 以 `{"data": source}` 为输入编译并执行一段生成代码
pub fn run_code(runner: &dyn CodeRunner, code: &str, source: &JsonValue) -> Result<JsonValue> {
    let compiled = runner.compile(code)?;
    let mut inputs = Map::new();
    inputs.insert("data".to_string(), data_source(source));
    runner.execute(&compiled, &inputs)
}

/// 数据源统一为对象，非对象输入视为空数据源
fn data_source(source: &JsonValue) -> JsonValue {
    match source {
        JsonValue::Object(_) => source.clone(),
        _ => json!({}),
    }
}

/// 基于规则引擎沙箱的执行器
///
/// 每段代码按 SHA-256 摘要注册为一个表达式执行集，重复的代码只编译一次。
/// 已编译代码按 LRU 保留，被淘汰的执行集同时从规则引擎注销。
pub struct SandboxCodeRunner {
    provider: Arc<dyn RuleServiceProvider>,
    compiled: Mutex<LruCache<String, CompiledCode>>,
}

impl SandboxCodeRunner {
    pub fn new(provider: Arc<dyn RuleServiceProvider>) -> Self {
        Self::with_capacity(provider, DEFAULT_COMPILE_CACHE_SIZE)
    }

    /// 容量为 0 时按 1 处理
    pub fn with_capacity(provider: Arc<dyn RuleServiceProvider>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            compiled: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn provider(&self) -> &Arc<dyn RuleServiceProvider> {
        &self.provider
    }

    pub fn cached_len(&self) -> usize {
        self.compiled.lock().len()
    }

    fn properties() -> RuleExecutionSetProperties {
        RuleExecutionSetProperties::new()
            .with_rule_group(EXPRESSION_RULE_GROUP)
            .with_rule_type(RuleType::Expression)
    }

    fn evict(&self, evicted: CompiledCode) {
        let admin = self.provider.rule_administrator();
        if let Err(e) = admin.deregister_rule_execution_set(&evicted.bind_uri, EXPRESSION_RULE_GROUP) {
            debug!(bind_uri = %evicted.bind_uri, error = %e, "淘汰的表达式注销失败");
        }
    }

    fn run(&self, compiled: &CompiledCode, inputs: &Map<String, JsonValue>) -> Result<JsonValue> {
        let session = self.provider.rule_runtime().create_rule_session(
            &compiled.bind_uri,
            &Self::properties(),
            RuleSessionType::Stateless,
        )?;
        let result = session.execute_rules(inputs);
        session.release();
        Ok(result?.into_iter().next().unwrap_or(JsonValue::Null))
    }
}

impl Default for SandboxCodeRunner {
    fn default() -> Self {
        Self::new(Arc::new(SandboxRuleServiceProvider::default()))
    }
}

impl CodeRunner for SandboxCodeRunner {
    fn compile(&self, code: &str) -> Result<CompiledCode> {
        let digest = format!("{:x}", Sha256::digest(code.as_bytes()));
        if let Some(compiled) = self.compiled.lock().get(&digest) {
            return Ok(compiled.clone());
        }

        let admin = self.provider.rule_administrator();
        let set = admin.execution_set_provider().create_rule_execution_set(
            vec![code.to_string()],
            Self::properties().with_name(format!("expression-{}", &digest[..16])),
        )?;
        let bind_uri = format!("flow-expr://{digest}");
        admin.register_rule_execution_set(&bind_uri, set)?;
        debug!(bind_uri = %bind_uri, "表达式已编译注册");

        let compiled = CompiledCode {
            bind_uri,
            code: code.to_string(),
        };
        let evicted = self.compiled.lock().push(digest.clone(), compiled.clone());
        if let Some((key, evicted)) = evicted
            && key != digest
        {
            self.evict(evicted);
        }
        Ok(compiled)
    }

    fn execute(&self, compiled: &CompiledCode, inputs: &Map<String, JsonValue>) -> Result<JsonValue> {
        match self.run(compiled, inputs) {
            // 编译后到执行前被淘汰，重新编译一次
            Err(FlowExprError::Engine(RuleError::ExecutionSetNotFound { .. })) => {
                let recompiled = self.compile(&compiled.code)?;
                self.run(&recompiled, inputs)
            }
            other => other,
        }
    }
}
