use crate::error::{Result, StormFlowError};
use std::env;

/// 环境变量配置管理
pub struct EnvConfig;

impl EnvConfig {
    /// 加载工作目录下的 `.env`（不存在时忽略）
    pub fn load_dotenv() {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
    }

    /// 获取 API Key
    ///
    /// 优先级：
    /// 1. `${VAR_NAME}` 形式时读取对应环境变量
    /// 2. 为空时读取 `default_env_var`
    /// 3. 否则原样返回
    pub fn get_api_key(api_key: &str, default_env_var: &str) -> Result<String> {
        if api_key.starts_with("${") && api_key.ends_with('}') {
            let env_var_name = &api_key[2..api_key.len() - 1];
            Self::get_env(env_var_name)
        } else if api_key.is_empty() {
            Self::get_env(default_env_var)
        } else {
            Ok(api_key.to_string())
        }
    }

    /// 从环境变量获取值
    pub fn get_env(key: &str) -> Result<String> {
        env::var(key).map_err(|_| {
            StormFlowError::Config(format!(
                "environment variable '{key}' is not set; add it to .env or export it"
            ))
        })
    }

    /// 获取可选的环境变量（空字符串视为未设置）
    pub fn get_env_optional(key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    /// 检查是否启用调试模式
    pub fn is_debug_mode() -> bool {
        env::var("STORMFLOW_DEBUG").is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_api_key_direct() {
        let result = EnvConfig::get_api_key("sk-1234567890abcdef", "STORMFLOW_TEST_UNUSED");
        assert_eq!(result.unwrap(), "sk-1234567890abcdef");
    }

    #[test]
    fn test_get_api_key_env_var() {
        env::set_var("STORMFLOW_TEST_KEY", "test_key_value");
        let result = EnvConfig::get_api_key("${STORMFLOW_TEST_KEY}", "FALLBACK_KEY");
        assert_eq!(result.unwrap(), "test_key_value");
        env::remove_var("STORMFLOW_TEST_KEY");
    }

    #[test]
    fn test_get_api_key_falls_back_to_default() {
        env::set_var("STORMFLOW_TEST_DEFAULT", "default_value");
        let result = EnvConfig::get_api_key("", "STORMFLOW_TEST_DEFAULT");
        assert_eq!(result.unwrap(), "default_value");
        env::remove_var("STORMFLOW_TEST_DEFAULT");
    }

    #[test]
    fn test_missing_env_is_config_error() {
        let err = EnvConfig::get_env("STORMFLOW_TEST_DEFINITELY_MISSING").unwrap_err();
        assert!(matches!(err, StormFlowError::Config(_)));
    }
}
