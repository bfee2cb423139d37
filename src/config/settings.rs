use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StormFlowError};

/// 模型调用参数，未填写的字段使用默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// 覆盖提供商默认 endpoint（Azure 必填，可由环境变量提供）
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 直接给出或 `${VAR}` 形式引用环境变量
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            endpoint: None,
            api_key: None,
            api_version: None,
        }
    }
}

impl ModelSettings {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// 文章生成流水线参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StormConfig {
    /// 每场访谈专家最多回答次数
    #[serde(default = "default_max_interview_turns")]
    pub max_interview_turns: usize,
    #[serde(default = "default_max_editors")]
    pub max_editors: usize,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    /// 并行访谈 / 章节写作的并发上限
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_search_max_results")]
    pub search_max_results: usize,
    #[serde(default)]
    pub model: ModelSettings,
}

fn default_max_interview_turns() -> usize {
    5
}

fn default_max_editors() -> usize {
    3
}

fn default_retrieval_top_k() -> usize {
    5
}

fn default_max_concurrency() -> usize {
    4
}

fn default_search_max_results() -> usize {
    3
}

impl Default for StormConfig {
    fn default() -> Self {
        Self {
            max_interview_turns: default_max_interview_turns(),
            max_editors: default_max_editors(),
            retrieval_top_k: default_retrieval_top_k(),
            max_concurrency: default_max_concurrency(),
            search_max_results: default_search_max_results(),
            model: ModelSettings::default(),
        }
    }
}

impl StormConfig {
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: StormConfig = serde_json::from_str(content)
            .map_err(|e| StormFlowError::Config(format!("invalid storm config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StormFlowError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_interview_turns == 0 {
            return Err(StormFlowError::Config(
                "max_interview_turns must be at least 1".into(),
            ));
        }
        if self.max_editors == 0 {
            return Err(StormFlowError::Config("max_editors must be at least 1".into()));
        }
        if self.max_concurrency == 0 {
            return Err(StormFlowError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_settings_defaults() {
        let settings: ModelSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.max_tokens, 4096);
        assert_eq!(settings, ModelSettings::default());
    }

    #[test]
    fn storm_config_partial_json() {
        let config =
            StormConfig::from_json_str(r#"{"max_editors": 2, "model": {"temperature": 0.1}}"#)
                .unwrap();
        assert_eq!(config.max_editors, 2);
        assert_eq!(config.max_interview_turns, 5);
        assert_eq!(config.model.temperature, 0.1);
        assert_eq!(config.model.max_tokens, 4096);
    }

    #[test]
    fn storm_config_rejects_zero_concurrency() {
        let err = StormConfig::from_json_str(r#"{"max_concurrency": 0}"#).unwrap_err();
        assert!(matches!(err, StormFlowError::Config(_)));
    }
}
