//! 规则服务提供者与提供者管理器

use crate::admin::RuleAdministrator;
use crate::cache::{CachedRuleExecutionSetRepository, RedisExecutionSetCache};
use crate::error::{Result, RuleError};
use crate::executable::ExecutableRegistry;
use crate::execution_set::RuleExecutionSetProvider;
use crate::repository::{DefaultRuleExecutionSetRepository, RuleExecutionSetRepository};
use crate::runtime::RuleRuntime;
use crate::sandbox::{Sandbox, SandboxLimits};
use dashmap::DashMap;
use flow_shared::config::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 规则服务提供者，暴露管理端与运行端
pub trait RuleServiceProvider: Send + Sync {
    fn rule_administrator(&self) -> &RuleAdministrator;

    fn rule_runtime(&self) -> &RuleRuntime;
}

/// 基于原生沙箱的提供者
pub struct SandboxRuleServiceProvider {
    administrator: RuleAdministrator,
    runtime: RuleRuntime,
}

impl SandboxRuleServiceProvider {
    pub const URI: &'static str = "flow://rule-engine/sandbox";

    /// 使用进程内仓库
    pub fn new(limits: SandboxLimits) -> Self {
        Self::with_repository(
            Arc::new(DefaultRuleExecutionSetRepository::new()),
            ExecutableRegistry::new(),
            Sandbox::new(limits),
        )
    }

    pub fn with_repository(
        repository: Arc<dyn RuleExecutionSetRepository>,
        registry: ExecutableRegistry,
        sandbox: Sandbox,
    ) -> Self {
        Self {
            administrator: RuleAdministrator::new(
                Arc::clone(&repository),
                registry.clone(),
                sandbox,
            ),
            runtime: RuleRuntime::new(repository, registry, sandbox),
        }
    }

    /// 按配置创建，启用缓存时在进程内仓库外包一层 Redis 缓存
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let sandbox = Sandbox::new(SandboxLimits::from(&config.sandbox));
        let registry = ExecutableRegistry::new();
        let inner: Arc<dyn RuleExecutionSetRepository> =
            Arc::new(DefaultRuleExecutionSetRepository::new());

        let repository: Arc<dyn RuleExecutionSetRepository> = if config.cache.enabled {
            let cache = RedisExecutionSetCache::new(&config.cache.redis_url)?;
            info!(ttl_seconds = config.cache.ttl_seconds, "执行集缓存已启用");
            Arc::new(CachedRuleExecutionSetRepository::new(
                inner,
                cache,
                RuleExecutionSetProvider::new(registry.clone(), sandbox),
                Duration::from_secs(config.cache.ttl_seconds),
            ))
        } else {
            inner
        };

        Ok(Self::with_repository(repository, registry, sandbox))
    }
}

impl Default for SandboxRuleServiceProvider {
    fn default() -> Self {
        Self::new(SandboxLimits::default())
    }
}

impl RuleServiceProvider for SandboxRuleServiceProvider {
    fn rule_administrator(&self) -> &RuleAdministrator {
        &self.administrator
    }

    fn rule_runtime(&self) -> &RuleRuntime {
        &self.runtime
    }
}

/// 提供者管理器，按 URI 登记提供者
#[derive(Clone, Default)]
pub struct RuleServiceProviderManager {
    providers: Arc<DashMap<String, Arc<dyn RuleServiceProvider>>>,
}

impl RuleServiceProviderManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_rule_service_provider(
        &self,
        uri: &str,
        provider: Arc<dyn RuleServiceProvider>,
    ) {
        if self.providers.insert(uri.to_string(), provider).is_some() {
            warn!("规则服务提供者已被覆盖: {}", uri);
        } else {
            info!("规则服务提供者已注册: {}", uri);
        }
    }

    pub fn rule_service_provider(&self, uri: &str) -> Result<Arc<dyn RuleServiceProvider>> {
        self.providers
            .get(uri)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| RuleError::ProviderNotFound(uri.to_string()))
    }

    pub fn deregister_rule_service_provider(&self, uri: &str) -> bool {
        self.providers.remove(uri).is_some()
    }

    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<_> = self.providers.iter().map(|p| p.key().clone()).collect();
        uris.sort();
        uris
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_manager_lookup() {
        let manager = RuleServiceProviderManager::new();
        manager.register_rule_service_provider(
            SandboxRuleServiceProvider::URI,
            Arc::new(SandboxRuleServiceProvider::default()),
        );

        assert!(manager.rule_service_provider(SandboxRuleServiceProvider::URI).is_ok());
        assert!(matches!(
            manager.rule_service_provider("flow://missing"),
            Err(RuleError::ProviderNotFound(_))
        ));
        assert_eq!(manager.uris(), vec![SandboxRuleServiceProvider::URI.to_string()]);

        assert!(manager.deregister_rule_service_provider(SandboxRuleServiceProvider::URI));
        assert!(manager.uris().is_empty());
    }

    #[test]
    fn test_from_config_without_cache() {
        let config = AppConfig::default();
        let provider = SandboxRuleServiceProvider::from_config(&config).unwrap();
        assert!(provider.rule_administrator().registrations().is_empty());
    }
}
