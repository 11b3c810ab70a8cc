//! 规则管理端：执行集的创建、注册、注销与执行代码登记

use crate::error::Result;
use crate::executable::{ExecutableCode, ExecutableRegistry};
use crate::execution_set::{RuleExecutionSet, RuleExecutionSetProvider};
use crate::repository::RuleExecutionSetRepository;
use crate::sandbox::Sandbox;
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct RuleAdministrator {
    repository: Arc<dyn RuleExecutionSetRepository>,
    registry: ExecutableRegistry,
    sandbox: Sandbox,
}

impl RuleAdministrator {
    pub fn new(
        repository: Arc<dyn RuleExecutionSetRepository>,
        registry: ExecutableRegistry,
        sandbox: Sandbox,
    ) -> Self {
        Self {
            repository,
            registry,
            sandbox,
        }
    }

    pub fn execution_set_provider(&self) -> RuleExecutionSetProvider {
        RuleExecutionSetProvider::new(self.registry.clone(), self.sandbox)
    }

    /// 注册执行集，分组取执行集属性中的分组
    #[instrument(skip(self, set))]
    pub fn register_rule_execution_set(&self, bind_uri: &str, set: RuleExecutionSet) -> Result<()> {
        let group = set.rule_group().to_string();
        self.repository.register(bind_uri, Arc::new(set))?;
        metrics::counter!("rule_execution_sets_registered_total", "group" => group).increment(1);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn deregister_rule_execution_set(&self, bind_uri: &str, rule_group: &str) -> Result<()> {
        self.repository.deregister(bind_uri, rule_group)
    }

    /// 已注册的 `(分组, bind_uri)`
    pub fn registrations(&self) -> Vec<(String, String)> {
        self.repository.registrations()
    }

    pub fn register_executable_code(&self, code: ExecutableCode) {
        self.registry.register(code);
    }
}
