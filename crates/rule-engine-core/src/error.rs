//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("规则编译失败: {0}")]
    CompileError(String),

    #[error("规则执行失败: {0}")]
    ExecutionError(String),

    /// 沙箱拒绝执行的操作（未注册的函数、类、常量或超出资源限制）
    #[error("受限操作: {0}")]
    RestrictedOperation(String),

    #[error("规则执行集未找到: {rule_group}:{bind_uri}")]
    ExecutionSetNotFound { bind_uri: String, rule_group: String },

    #[error("规则服务提供者未找到: {0}")]
    ProviderNotFound(String),

    #[error("占位符缺少取值: {0}")]
    PlaceholderMissing(String),

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("缓存操作失败: {0}")]
    CacheError(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RuleError {
    /// 是否为 DSL 本身的问题（语法、受限操作），而非输入数据导致的执行失败
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::ParseError(_)
                | Self::CompileError(_)
                | Self::RestrictedOperation(_)
                | Self::PlaceholderMissing(_)
        )
    }
}

impl From<redis::RedisError> for RuleError {
    fn from(e: redis::RedisError) -> Self {
        Self::CacheError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
