use std::collections::HashMap;

use crate::error::{Result, StormFlowError};
use crate::llm::types::{ChatMessage, ContentPart, Role};

/// 聊天提示模板：system → 历史占位 → 用户（文本 + 图片）
#[derive(Debug, Clone)]
pub struct ChatPromptTemplate {
    system: Option<String>,
    user_parts: Vec<ContentPart>,
}

impl ChatPromptTemplate {
    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    pub fn user_parts(&self) -> &[ContentPart] {
        &self.user_parts
    }

    /// 把历史插入占位处，生成完整消息序列
    pub fn format_messages(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::with_parts(Role::User, self.user_parts.clone()));
        messages
    }
}

/// 空 system prompt 不生成 system 消息
pub fn create_prompt(system_prompt: &str, input_text: &str, input_images: &[String]) -> ChatPromptTemplate {
    let system = Some(system_prompt.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let mut user_parts = Vec::with_capacity(input_images.len() + 1);
    user_parts.push(ContentPart::text(input_text));
    user_parts.extend(input_images.iter().map(|data| ContentPart::jpeg_base64(data)));

    ChatPromptTemplate { system, user_parts }
}

/// `{name}` 占位的文本模板
///
/// 模板中的 `{{` 和 `}}` 输出为字面的 `{`、`}`，方便在提示里写 JSON 示例。
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: &'static str,
}

impl PromptTemplate {
    pub const fn new(template: &'static str) -> Self {
        Self { template }
    }

    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        let mut output = String::with_capacity(self.template.len());
        let mut rest = self.template;

        while let Some(pos) = rest.find(['{', '}']) {
            output.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if tail.starts_with("{{") {
                output.push('{');
                rest = &tail[2..];
            } else if tail.starts_with("}}") {
                output.push('}');
                rest = &tail[2..];
            } else if tail.starts_with('{') {
                let end = tail.find('}').ok_or_else(|| {
                    StormFlowError::Parse(format!("unclosed placeholder in template: {tail}"))
                })?;
                let name = &tail[1..end];
                let value = vars.get(name).ok_or_else(|| {
                    StormFlowError::Parse(format!("missing template variable `{name}`"))
                })?;
                output.push_str(value);
                rest = &tail[end + 1..];
            } else {
                return Err(StormFlowError::Parse(
                    "unmatched `}` in template".to_string(),
                ));
            }
        }
        output.push_str(rest);
        Ok(output)
    }
}
