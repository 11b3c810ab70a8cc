//! 规则沙箱
//!
//! 执行集中的规则源码最终在这里被解析与求值。沙箱只认识：
//! - 字面量、变量、下标访问、数组字面量
//! - 内置白名单函数（见 [`builtins`]）
//! - 通过 [`CallableScope`] 暴露的宿主函数、静态方法与常量
//!
//! 任何未登记的调用都会在编译期以 [`RuleError::RestrictedOperation`] 拒绝。

pub mod ast;
pub mod builtins;
pub mod interpreter;
pub mod lexer;
pub mod ops;
pub mod parser;

use crate::error::{Result, RuleError};
use ast::{Program, References};
use flow_shared::config::SandboxConfig;
use interpreter::Interpreter;
use lexer::Lexer;
use parser::Parser;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// 宿主函数
pub type HostFunction = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// 沙箱可见的外部符号
pub trait CallableScope {
    fn function(&self, name: &str) -> Option<HostFunction>;

    fn static_method(&self, class: &str, method: &str) -> Option<HostFunction>;

    fn constant(&self, name: &str) -> Option<Value>;
}

/// 不暴露任何宿主符号的作用域
pub struct EmptyScope;

impl CallableScope for EmptyScope {
    fn function(&self, _name: &str) -> Option<HostFunction> {
        None
    }

    fn static_method(&self, _class: &str, _method: &str) -> Option<HostFunction> {
        None
    }

    fn constant(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// 沙箱资源限制
#[derive(Debug, Clone, Copy)]
pub struct SandboxLimits {
    /// 单条规则源码的最大字节数
    pub max_source_len: usize,
    /// 语法嵌套的最大层级
    pub max_depth: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_source_len: 64 * 1024,
            max_depth: 64,
        }
    }
}

impl From<&SandboxConfig> for SandboxLimits {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            max_source_len: config.max_source_len,
            max_depth: config.max_depth,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sandbox {
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    /// 编译表达式规则
    pub fn compile_expression(&self, source: &str, scope: &dyn CallableScope) -> Result<Program> {
        let parser = self.parser(source)?;
        let program = parser.parse_expression_program()?;
        self.verify(&program, scope)?;
        debug!(source_len = source.len(), "表达式规则编译完成");
        Ok(program)
    }

    /// 编译脚本规则
    pub fn compile_script(&self, source: &str, scope: &dyn CallableScope) -> Result<Program> {
        let parser = self.parser(source)?;
        let program = parser.parse_script_program()?;
        self.verify(&program, scope)?;
        debug!(source_len = source.len(), "脚本规则编译完成");
        Ok(program)
    }

    /// 执行编译产物，`inputs` 的每个顶层键都成为一个变量
    pub fn execute(
        &self,
        program: &Program,
        inputs: &Map<String, Value>,
        scope: &dyn CallableScope,
    ) -> Result<Value> {
        Interpreter::new(scope, inputs).run(program)
    }

    fn parser(&self, source: &str) -> Result<Parser> {
        if source.len() > self.limits.max_source_len {
            return Err(RuleError::RestrictedOperation(format!(
                "规则源码长度 {} 超过上限 {}",
                source.len(),
                self.limits.max_source_len
            )));
        }
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Parser::new(tokens, self.limits.max_depth))
    }

    /// 白名单校验
    fn verify(&self, program: &Program, scope: &dyn CallableScope) -> Result<()> {
        let refs = References::collect(program);
        for name in &refs.functions {
            if !builtins::is_builtin(name) && scope.function(name).is_none() {
                return Err(RuleError::RestrictedOperation(format!(
                    "函数 {name} 未注册"
                )));
            }
        }
        for (class, method) in &refs.static_calls {
            if scope.static_method(class, method).is_none() {
                return Err(RuleError::RestrictedOperation(format!(
                    "静态方法 {class}::{method} 未注册"
                )));
            }
        }
        for name in &refs.constants {
            if scope.constant(name).is_none() {
                return Err(RuleError::RestrictedOperation(format!(
                    "常量 {name} 未注册"
                )));
            }
        }
        Ok(())
    }
}
