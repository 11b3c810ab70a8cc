//! 配置管理模块
//!
//! 支持配置文件加载、环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

/// 表达式引擎配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 表单字段加密的基础密钥，为空时使用默认密钥
    pub aes_key: String,
    /// 脱敏控件展示的掩码
    pub desensitize_mask: String,
    /// 最多保留的已编译表达式数
    pub compile_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aes_key: String::new(),
            desensitize_mask: "******".to_string(),
            compile_cache_size: 1024,
        }
    }
}

/// 沙箱资源限制配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub max_source_len: usize,
    pub max_depth: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_source_len: 64 * 1024,
            max_depth: 64,
        }
    }
}

/// 执行集缓存配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub redis_url: String,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: "redis://localhost:6379".to_string(),
            ttl_seconds: 90,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn is_json(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub environment: String,
    pub engine: EngineConfig,
    pub sandbox: SandboxConfig,
    pub cache: CacheConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. 环境变量（FLOW_ 前缀，层级以双下划线分隔，如 FLOW_ENGINE__AES_KEY -> engine.aes_key）
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("FLOW_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Config::builder()
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                Environment::with_prefix("FLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// 从 TOML 文本加载，未出现的配置项取默认值
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.sandbox.max_depth, 64);
        assert_eq!(config.cache.ttl_seconds, 90);
        assert_eq!(config.engine.desensitize_mask, "******");
        assert_eq!(config.engine.compile_cache_size, 1024);
        assert!(!config.cache.enabled);
        assert!(!config.observability.is_json());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = AppConfig::from_toml_str(
            r#"
            environment = "production"

            [engine]
            aes_key = "secret"

            [sandbox]
            max_depth = 16

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert!(config.is_production());
        assert_eq!(config.engine.aes_key, "secret");
        assert_eq!(config.engine.desensitize_mask, "******");
        assert_eq!(config.sandbox.max_depth, 16);
        assert_eq!(config.sandbox.max_source_len, 64 * 1024);
        assert!(config.observability.is_json());
    }

    #[test]
    fn test_load_without_files() {
        // SAFETY: 测试环境中单线程执行，不会有并发问题
        unsafe {
            std::env::set_var("CONFIG_DIR", "/nonexistent-flow-config");
        }
        let config = AppConfig::load().unwrap();
        assert_eq!(config.sandbox.max_depth, 64);
        unsafe {
            std::env::remove_var("CONFIG_DIR");
        }
    }
}
