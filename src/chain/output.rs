use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::error::{Result, StormFlowError};

/// 原样返回模型文本
#[derive(Debug, Clone, Copy, Default)]
pub struct StrOutputParser;

impl StrOutputParser {
    pub fn parse(&self, content: &str) -> String {
        content.to_string()
    }
}

/// 去掉 ```json 代码块包裹
pub fn clean_response(response: &str) -> &str {
    let trimmed = response.trim();
    for fence in ["```json", "```JSON", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let body_start = start + fence.len();
            if let Some(end) = trimmed[body_start..].find("```") {
                return trimmed[body_start..body_start + end].trim();
            }
        }
    }
    trimmed
}

/// 把模型输出解析为结构化记录
#[derive(Debug, Clone, Copy)]
pub struct JsonOutputParser<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonOutputParser<T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> JsonOutputParser<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, content: &str) -> Result<T> {
        let cleaned = clean_response(content);
        if let Ok(value) = serde_json::from_str(cleaned) {
            return Ok(value);
        }
        // 模型偶尔在 JSON 前后加说明文字
        let sliced = match (cleaned.find('{'), cleaned.rfind('}')) {
            (Some(start), Some(end)) if start < end => &cleaned[start..=end],
            _ => cleaned,
        };
        serde_json::from_str(sliced).map_err(|e| {
            let preview: String = content.chars().take(200).collect();
            StormFlowError::Parse(format!(
                "cannot parse {} from model output: {e}; output: {preview}",
                std::any::type_name::<T>()
            ))
        })
    }
}
