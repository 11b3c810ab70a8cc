//! 规则执行引擎
//!
//! 管理端把规则源码编译为执行集并按 `(分组, bind_uri)` 注册，
//! 运行端为执行集创建无状态会话并在原生沙箱中求值。
//!
//! ```text
//! RuleServiceProviderManager
//!   └─ RuleServiceProvider
//!        ├─ RuleAdministrator ── RuleExecutionSetProvider ── Sandbox::compile_*
//!        │        └─ RuleExecutionSetRepository (进程内 / 缓存装饰)
//!        └─ RuleRuntime ── StatelessRuleSession ── Sandbox::execute
//! ```

pub mod admin;
pub mod cache;
pub mod error;
pub mod executable;
pub mod execution_set;
pub mod properties;
pub mod provider;
pub mod repository;
pub mod runtime;
pub mod sandbox;
pub mod session;

pub use admin::RuleAdministrator;
pub use cache::{
    CachedRuleExecutionSetRepository, ExecutionSetCache, InMemoryExecutionSetCache,
    RedisExecutionSetCache,
};
pub use error::{Result, RuleError};
pub use executable::{
    COMMON_GROUP, ExecutableClass, ExecutableCode, ExecutableConstant, ExecutableFunction,
    ExecutableRegistry,
};
pub use execution_set::{RuleExecutionSet, RuleExecutionSetProvider};
pub use properties::{RuleExecutionSetProperties, RuleSessionType, RuleType};
pub use provider::{RuleServiceProvider, RuleServiceProviderManager, SandboxRuleServiceProvider};
pub use repository::{DefaultRuleExecutionSetRepository, RuleExecutionSetRepository};
pub use runtime::RuleRuntime;
pub use sandbox::{Sandbox, SandboxLimits};
pub use session::StatelessRuleSession;

/// 注册引擎指标描述
pub fn describe_metrics() {
    metrics::describe_counter!(
        "rule_sessions_created_total",
        "Total number of rule sessions created"
    );
    metrics::describe_counter!("rule_executions_total", "Total number of rule executions");
    metrics::describe_counter!(
        "rule_execution_sets_registered_total",
        "Total number of rule execution sets registered"
    );
}
