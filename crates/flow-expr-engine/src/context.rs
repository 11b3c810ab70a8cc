//! 引擎上下文
//!
//! 调用方显式构造并按引用传入，持有代码执行器与字段加密的基础密钥。

use crate::code_runner::{CodeRunner, SandboxCodeRunner, run_code};
use crate::error::Result;
use crate::widget::ShowOptions;
use flow_shared::config::AppConfig;
use flow_shared::crypto::DESENSITIZE_MASK;
use rule_engine_core::SandboxRuleServiceProvider;
use serde_json::Value as JsonValue;
use std::sync::Arc;

#[derive(Clone)]
pub struct EngineContext {
    runner: Arc<dyn CodeRunner>,
    aes_key: String,
    desensitize_mask: String,
}

impl EngineContext {
    pub fn new(runner: Arc<dyn CodeRunner>) -> Self {
        Self {
            runner,
            aes_key: String::new(),
            desensitize_mask: DESENSITIZE_MASK.to_string(),
        }
    }

    /// 按配置创建，规则引擎提供者同样由配置决定是否启用缓存
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let provider = SandboxRuleServiceProvider::from_config(config)?;
        let runner =
            SandboxCodeRunner::with_capacity(Arc::new(provider), config.engine.compile_cache_size);
        Ok(Self::new(Arc::new(runner))
            .with_aes_key(config.engine.aes_key.clone())
            .with_desensitize_mask(config.engine.desensitize_mask.clone()))
    }

    pub fn with_aes_key(mut self, aes_key: impl Into<String>) -> Self {
        self.aes_key = aes_key.into();
        self
    }

    pub fn with_desensitize_mask(mut self, mask: impl Into<String>) -> Self {
        self.desensitize_mask = mask.into();
        self
    }

    pub fn runner(&self) -> &dyn CodeRunner {
        self.runner.as_ref()
    }

    pub fn aes_key(&self) -> &str {
        &self.aes_key
    }

    pub fn desensitize_mask(&self) -> &str {
        &self.desensitize_mask
    }

    /// 按上下文的掩码生成控件展示选项
    pub fn show_options(&self, desensitization: bool) -> ShowOptions {
        ShowOptions::new(desensitization).with_mask(self.desensitize_mask.clone())
    }

    /// 执行生成代码，`source` 以 `$data` 暴露给代码
    pub fn run(&self, code: &str, source: &JsonValue) -> Result<JsonValue> {
        run_code(self.runner.as_ref(), code, source)
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(Arc::new(SandboxCodeRunner::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_runner::{CompiledCode, MockCodeRunner};
    use serde_json::json;

    #[test]
    fn test_from_config() {
        let config = AppConfig::from_toml_str(
            r#"
            [engine]
            aes_key = "flow-secret"
            desensitize_mask = "***"
            "#,
        )
        .unwrap();
        let ctx = EngineContext::from_config(&config).unwrap();
        assert_eq!(ctx.aes_key(), "flow-secret");
        assert_eq!(ctx.desensitize_mask(), "***");
        assert_eq!(ctx.show_options(true).mask(), "***");
        assert_eq!(ctx.run("1 + 1", &json!({})).unwrap(), json!(2));
    }

    #[test]
    fn test_run_delegates_to_runner() {
        let mut runner = MockCodeRunner::new();
        runner.expect_compile().times(1).returning(|code| {
            Ok(CompiledCode {
                bind_uri: "mock://code".to_string(),
                code: code.to_string(),
            })
        });
        runner
            .expect_execute()
            .withf(|compiled, inputs| {
                compiled.code == "$data['x']" && inputs.get("data") == Some(&json!({"x": 1}))
            })
            .times(1)
            .returning(|_, _| Ok(json!(1)));

        let ctx = EngineContext::new(Arc::new(runner));
        assert_eq!(ctx.run("$data['x']", &json!({"x": 1})).unwrap(), json!(1));
    }
}
