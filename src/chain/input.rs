use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::image::resize_base64_image;
use crate::error::Result;

/// 用户输入：纯文本，或带附件的多模态输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatInput {
    Multimodal {
        #[serde(default)]
        text: String,
        #[serde(default)]
        files: Vec<Value>,
    },
    Text(String),
}

impl From<&str> for ChatInput {
    fn from(text: &str) -> Self {
        ChatInput::Text(text.to_string())
    }
}

impl From<String> for ChatInput {
    fn from(text: String) -> Self {
        ChatInput::Text(text)
    }
}

impl ChatInput {
    /// 由文本与图片路径构造多模态输入
    pub fn with_files<I, S>(text: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ChatInput::Multimodal {
            text: text.into(),
            files: files.into_iter().map(|f| Value::String(f.into())).collect(),
        }
    }
}

/// 附件可以是字符串，或带 `url` / `path` 字段的对象；其他形状忽略
fn file_source(file: &Value) -> Option<String> {
    match file {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => Some(
            map.get("url")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .or_else(|| map.get("path").and_then(Value::as_str))
                .unwrap_or_default()
                .to_string(),
        ),
        _ => None,
    }
}

/// 拆出文本与缩放后的 base64 图片
pub fn process_input(input: &ChatInput) -> Result<(String, Vec<String>)> {
    match input {
        ChatInput::Text(text) => Ok((text.clone(), Vec::new())),
        ChatInput::Multimodal { text, files } => {
            let mut images = Vec::with_capacity(files.len());
            for file in files {
                let Some(source) = file_source(file) else {
                    tracing::debug!(file = %file, "skipping unsupported attachment");
                    continue;
                };
                images.push(resize_base64_image(&source)?);
            }
            Ok((text.clone(), images))
        }
    }
}
