use std::fmt;
use std::str::FromStr;

use crate::config::{EnvConfig, ModelSettings};
use crate::error::{Result, StormFlowError};

use super::client::DynChatModel;
use super::types::ApiFormat;

const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// 支持的模型提供商
///
/// 提供商只决定 endpoint、认证方式和接口格式；模型名、温度等参数由调用方给出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelProvider {
    #[default]
    OpenAI,
    AzureOpenAI,
    OpenRouter,
    Together,
    Google,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::OpenAI => "OpenAI",
            ModelProvider::AzureOpenAI => "AzureOpenAI",
            ModelProvider::OpenRouter => "OpenRouter",
            ModelProvider::Together => "Together",
            ModelProvider::Google => "Google",
        }
    }

    /// 未在 `ModelSettings.endpoint` 中覆盖时使用的地址
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            ModelProvider::OpenAI => Some("https://api.openai.com/v1"),
            ModelProvider::AzureOpenAI => None,
            ModelProvider::OpenRouter => Some("https://openrouter.ai/api/v1"),
            ModelProvider::Together => Some("https://api.together.xyz/v1"),
            ModelProvider::Google => Some("https://generativelanguage.googleapis.com/v1beta"),
        }
    }

    pub fn default_env_key(&self) -> &'static str {
        match self {
            ModelProvider::OpenAI => "OPENAI_API_KEY",
            ModelProvider::AzureOpenAI => "AZURE_OPENAI_API_KEY",
            ModelProvider::OpenRouter => "OPENROUTER_API_KEY",
            ModelProvider::Together => "TOGETHER_API_KEY",
            ModelProvider::Google => "GOOGLE_API_KEY",
        }
    }

    /// 提供商要求的模型标识
    pub fn model_id(&self, model_name: &str) -> String {
        match self {
            ModelProvider::Google if !model_name.starts_with("models/") => {
                format!("models/{model_name}")
            }
            _ => model_name.to_string(),
        }
    }

    pub fn supports_images(&self) -> bool {
        !matches!(self, ModelProvider::Together)
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelProvider {
    type Err = StormFlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ModelProvider::OpenAI),
            "azureopenai" | "azure" => Ok(ModelProvider::AzureOpenAI),
            "openrouter" => Ok(ModelProvider::OpenRouter),
            "together" => Ok(ModelProvider::Together),
            "google" | "gemini" => Ok(ModelProvider::Google),
            other => Err(StormFlowError::Config(format!(
                "unknown model provider: {other}"
            ))),
        }
    }
}

/// 解析后的完整模型调用配置
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub provider: ModelProvider,
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    pub format: ApiFormat,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelSpec {
    /// 根据提供商与参数解析 endpoint、key 与接口格式
    pub fn resolve(
        provider: ModelProvider,
        model_name: &str,
        settings: &ModelSettings,
    ) -> Result<Self> {
        if model_name.trim().is_empty() {
            return Err(StormFlowError::Config("model name must not be empty".into()));
        }

        let endpoint = settings
            .endpoint
            .clone()
            .or_else(|| match provider {
                ModelProvider::AzureOpenAI => EnvConfig::get_env_optional("AZURE_OPENAI_ENDPOINT"),
                _ => provider.default_endpoint().map(str::to_string),
            })
            .ok_or_else(|| {
                StormFlowError::Config(format!(
                    "missing endpoint for provider '{provider}'; set AZURE_OPENAI_ENDPOINT or pass an endpoint"
                ))
            })?;

        let api_key = EnvConfig::get_api_key(
            settings.api_key.as_deref().unwrap_or_default(),
            provider.default_env_key(),
        )?;

        let format = match provider {
            ModelProvider::OpenAI | ModelProvider::OpenRouter => ApiFormat::OpenAI,
            ModelProvider::AzureOpenAI => ApiFormat::Azure {
                api_version: settings
                    .api_version
                    .clone()
                    .or_else(|| EnvConfig::get_env_optional("OPENAI_API_VERSION"))
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            },
            ModelProvider::Together => ApiFormat::Completion,
            ModelProvider::Google => ApiFormat::Gemini,
        };

        Ok(Self {
            provider,
            model: provider.model_id(model_name),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            format,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }
}

/// 解析提供商名称；`None` 表示使用默认提供商 OpenAI
pub fn parse_provider(provider: Option<&str>) -> Result<ModelProvider> {
    match provider {
        None => Ok(ModelProvider::default()),
        Some(name) => name.parse(),
    }
}

/// 按提供商创建聊天模型客户端
#[cfg(feature = "http-providers")]
pub fn select_model(
    provider: Option<&str>,
    model_name: &str,
    settings: &ModelSettings,
) -> Result<DynChatModel> {
    let provider = parse_provider(provider)?;
    let spec = ModelSpec::resolve(provider, model_name, settings)?;
    tracing::info!(provider = %spec.provider, model = %spec.model, "selected chat model");
    Ok(std::sync::Arc::new(super::http::GenericHttpClient::new(spec)))
}

#[cfg(not(feature = "http-providers"))]
pub fn select_model(
    provider: Option<&str>,
    model_name: &str,
    settings: &ModelSettings,
) -> Result<DynChatModel> {
    let provider = parse_provider(provider)?;
    ModelSpec::resolve(provider, model_name, settings)?;
    Err(StormFlowError::Config(format!(
        "provider '{provider}' requires the `http-providers` feature"
    )))
}
