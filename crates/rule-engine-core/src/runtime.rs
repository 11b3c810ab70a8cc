//! 规则运行端：按 bind_uri 创建会话

use crate::error::{Result, RuleError};
use crate::executable::ExecutableRegistry;
use crate::execution_set::compile_rules;
use crate::properties::{RuleExecutionSetProperties, RuleSessionType};
use crate::repository::RuleExecutionSetRepository;
use crate::sandbox::Sandbox;
use crate::session::StatelessRuleSession;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct RuleRuntime {
    repository: Arc<dyn RuleExecutionSetRepository>,
    registry: ExecutableRegistry,
    sandbox: Sandbox,
}

impl RuleRuntime {
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

    /// 创建会话
    ///
    /// 分组取 `properties` 中的分组。执行集需要占位符时，会话提供的取值覆盖执行集上的同名取值，
    /// 并为本会话单独编译语法树。
    #[instrument(skip(self, properties), fields(group = %properties.group()))]
    pub fn create_rule_session(
        &self,
        bind_uri: &str,
        properties: &RuleExecutionSetProperties,
        session_type: RuleSessionType,
    ) -> Result<StatelessRuleSession> {
        let RuleSessionType::Stateless = session_type;
        let group = properties.group();

        let set = self
            .repository
            .get(bind_uri, group)?
            .ok_or_else(|| RuleError::ExecutionSetNotFound {
                bind_uri: bind_uri.to_string(),
                rule_group: group.to_string(),
            })?;

        let scope = self.registry.scope(set.rule_group());
        let set_properties = set.properties();
        let asts = if set_properties.resolve_placeholders
            && (set.is_deferred() || !properties.placeholders.is_empty())
        {
            let mut placeholders = set_properties.placeholders.clone();
            placeholders.extend(
                properties
                    .placeholders
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            debug!("绑定占位符后为会话编译规则");
            Arc::new(compile_rules(
                &self.sandbox,
                set.rules(),
                set_properties,
                &placeholders,
                &scope,
            )?)
        } else {
            set.shared_asts()
        };

        metrics::counter!("rule_sessions_created_total", "group" => group.to_string()).increment(1);
        Ok(StatelessRuleSession::new(
            bind_uri,
            set,
            asts,
            scope,
            self.sandbox,
        ))
    }
}
