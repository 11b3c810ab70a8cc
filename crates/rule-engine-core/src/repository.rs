//! 执行集仓库
//!
//! 进程内仓库使用 DashMap 保存已注册的执行集，键为 `(分组, bind_uri)`。
//! 执行集注册后不可变，读取方拿到的是 `Arc` 快照，不会看到注册到一半的状态。

use crate::error::{Result, RuleError};
use crate::execution_set::RuleExecutionSet;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub trait RuleExecutionSetRepository: Send + Sync {
    /// 注册执行集，同一键重复注册会覆盖
    fn register(&self, bind_uri: &str, set: Arc<RuleExecutionSet>) -> Result<()>;

    /// 注销执行集，不存在时返回 `ExecutionSetNotFound`
    fn deregister(&self, bind_uri: &str, rule_group: &str) -> Result<()>;

    fn get(&self, bind_uri: &str, rule_group: &str) -> Result<Option<Arc<RuleExecutionSet>>>;

    /// 已注册的 `(分组, bind_uri)`
    fn registrations(&self) -> Vec<(String, String)>;
}

/// 进程内执行集仓库
#[derive(Clone, Default)]
pub struct DefaultRuleExecutionSetRepository {
    sets: Arc<DashMap<(String, String), Arc<RuleExecutionSet>>>,
}

impl DefaultRuleExecutionSetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl RuleExecutionSetRepository for DefaultRuleExecutionSetRepository {
    #[instrument(skip(self, set), fields(group = %set.rule_group()))]
    fn register(&self, bind_uri: &str, set: Arc<RuleExecutionSet>) -> Result<()> {
        let key = (set.rule_group().to_string(), bind_uri.to_string());
        if self.sets.insert(key, set).is_some() {
            info!("执行集已覆盖: {}", bind_uri);
        } else {
            info!("执行集已注册: {}", bind_uri);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn deregister(&self, bind_uri: &str, rule_group: &str) -> Result<()> {
        let key = (rule_group.to_string(), bind_uri.to_string());
        if self.sets.remove(&key).is_some() {
            info!("执行集已注销: {}", bind_uri);
            Ok(())
        } else {
            warn!("注销不存在的执行集: {}", bind_uri);
            Err(RuleError::ExecutionSetNotFound {
                bind_uri: bind_uri.to_string(),
                rule_group: rule_group.to_string(),
            })
        }
    }

    fn get(&self, bind_uri: &str, rule_group: &str) -> Result<Option<Arc<RuleExecutionSet>>> {
        let key = (rule_group.to_string(), bind_uri.to_string());
        Ok(self.sets.get(&key).map(|s| Arc::clone(s.value())))
    }

    fn registrations(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.sets.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}
