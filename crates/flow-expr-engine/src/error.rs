//! 表达式引擎错误类型
//!
//! 校验、类型转换与结构匹配错误的消息直接面向搭建页面，
//! 因此只保留消息本身（其中已包含出错的 key 或标签）。

use flow_shared::crypto::CryptoError;
use rule_engine_core::RuleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowExprError {
    // ==================== 搭建期错误 ====================
    /// 结构不完整或不合法，如缺少比较值、未知的节点类型
    #[error("{0}")]
    Validation(String),

    /// `DataType` 与运行结果不匹配（仅在 check 模式下抛出）
    #[error("{0}")]
    TypeCoercion(String),

    /// 输入数据与表单结构不匹配，或必填项缺失
    #[error("{0}")]
    SchemaMismatch(String),

    // ==================== 运行期错误 ====================
    #[error("规则引擎错误: {0}")]
    Engine(#[from] RuleError),

    #[error("字段加解密失败: {0}")]
    Crypto(#[from] CryptoError),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowExprError>;

impl FlowExprError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::TypeCoercion(_) => "TYPE_COERCION_ERROR",
            Self::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            Self::Engine(e) if e.is_definition_error() => "INVALID_EXPRESSION",
            Self::Engine(_) => "ENGINE_ERROR",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch(message.into())
    }
}
