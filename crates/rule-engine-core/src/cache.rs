//! 执行集缓存
//!
//! [`CachedRuleExecutionSetRepository`] 在进程内仓库之外再把执行集的源码与属性
//! 写入外部缓存，供多个工作进程共享。缓存中不保存语法树，读取时重新编译。

use crate::error::{Result, RuleError};
use crate::executable::COMMON_GROUP;
use crate::execution_set::{ExecutionSetSnapshot, RuleExecutionSet, RuleExecutionSetProvider};
use crate::repository::RuleExecutionSetRepository;
use dashmap::DashMap;
use redis::{Client, Commands};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// 未设置分组时缓存键使用的分组名
pub const CACHE_COMMON_GROUP: &str = "commonGroup";

/// 外部缓存
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionSetCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;
}

/// 生成缓存键
pub fn cache_key(rule_group: &str, bind_uri: &str) -> String {
    let group = if rule_group.is_empty() || rule_group == COMMON_GROUP {
        CACHE_COMMON_GROUP
    } else {
        rule_group
    };
    format!("{group}:{bind_uri}")
}

// ==================== 进程内缓存 ====================

/// 进程内缓存，适用于单进程部署与测试
#[derive(Clone, Default)]
pub struct InMemoryExecutionSetCache {
    entries: Arc<DashMap<String, (String, Instant)>>,
}

impl InMemoryExecutionSetCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionSetCache for InMemoryExecutionSetCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

// ==================== Redis 缓存 ====================

/// Redis 缓存
#[derive(Clone)]
pub struct RedisExecutionSetCache {
    client: Client,
}

impl RedisExecutionSetCache {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        info!("Redis client created");
        Ok(Self { client })
    }

    fn conn(&self) -> Result<redis::Connection> {
        self.client.get_connection().map_err(RuleError::from)
    }
}

impl ExecutionSetCache for RedisExecutionSetCache {
    #[instrument(skip(self))]
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn()?;
        let value: Option<String> = conn.get(key)?;
        Ok(value)
    }

    #[instrument(skip(self, value))]
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn()?;
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1))?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let _: () = conn.del(key)?;
        Ok(())
    }
}

// ==================== 缓存装饰仓库 ====================

/// 带外部缓存的执行集仓库
///
/// 注册时同时写入内部仓库与缓存；读取时优先读缓存并重建执行集，
/// 缓存不可用或未命中时回落到内部仓库。
pub struct CachedRuleExecutionSetRepository<C: ExecutionSetCache> {
    inner: Arc<dyn RuleExecutionSetRepository>,
    cache: C,
    provider: RuleExecutionSetProvider,
    ttl: Duration,
}

impl<C: ExecutionSetCache> CachedRuleExecutionSetRepository<C> {
    pub fn new(
        inner: Arc<dyn RuleExecutionSetRepository>,
        cache: C,
        provider: RuleExecutionSetProvider,
        ttl: Duration,
    ) -> Self {
        Self {
            inner,
            cache,
            provider,
            ttl,
        }
    }

    fn load_from_cache(&self, key: &str) -> Result<Option<RuleExecutionSet>> {
        let Some(raw) = self.cache.get(key)? else {
            return Ok(None);
        };
        let snapshot: ExecutionSetSnapshot = serde_json::from_str(&raw)?;
        self.provider.restore(snapshot).map(Some)
    }
}

impl<C: ExecutionSetCache> RuleExecutionSetRepository for CachedRuleExecutionSetRepository<C> {
    #[instrument(skip(self, set), fields(group = %set.rule_group()))]
    fn register(&self, bind_uri: &str, set: Arc<RuleExecutionSet>) -> Result<()> {
        let key = cache_key(set.rule_group(), bind_uri);
        let payload = serde_json::to_string(&set.snapshot())?;
        self.cache.set(&key, payload, self.ttl)?;
        debug!("执行集已写入缓存: {}", key);
        self.inner.register(bind_uri, set)
    }

    #[instrument(skip(self))]
    fn deregister(&self, bind_uri: &str, rule_group: &str) -> Result<()> {
        let key = cache_key(rule_group, bind_uri);
        if let Err(e) = self.cache.delete(&key) {
            warn!("删除执行集缓存失败: {}, {}", key, e);
        }
        self.inner.deregister(bind_uri, rule_group)
    }

    fn get(&self, bind_uri: &str, rule_group: &str) -> Result<Option<Arc<RuleExecutionSet>>> {
        let key = cache_key(rule_group, bind_uri);
        match self.load_from_cache(&key) {
            Ok(Some(set)) => {
                debug!("执行集缓存命中: {}", key);
                return Ok(Some(Arc::new(set)));
            }
            Ok(None) => debug!("执行集缓存未命中: {}", key),
            Err(e) if e.is_definition_error() => return Err(e),
            Err(e) => warn!("读取执行集缓存失败: {}, {}", key, e),
        }
        self.inner.get(bind_uri, rule_group)
    }

    fn registrations(&self) -> Vec<(String, String)> {
        self.inner.registrations()
    }
}
