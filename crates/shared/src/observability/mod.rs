//! 可观测性模块
//!
//! 所有入口通过 [`init_tracing`] 统一初始化日志。

pub mod tracing;

pub use self::tracing::init_tracing;
