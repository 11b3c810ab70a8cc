//! 共享库
//!
//! 包含各 crate 共用的配置加载、日志初始化与字段加密。

pub mod config;
pub mod crypto;
pub mod observability;
