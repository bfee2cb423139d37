//! 各接口格式的请求体构建与响应解析

use serde_json::{json, Value};
use tracing::warn;

use crate::error::{Result, StormFlowError};
use crate::llm::types::{ApiFormat, ChatMessage, ChatRequest, ContentPart, Role, TokenUsage};

/// 请求参数：请求里未指定时回落到客户端默认值
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

pub fn build_body(
    format: &ApiFormat,
    model: &str,
    request: &ChatRequest,
    sampling: &Sampling,
    stream: bool,
) -> Value {
    let temperature = request.temperature.unwrap_or(sampling.temperature);
    let max_tokens = request.max_tokens.unwrap_or(sampling.max_tokens);

    match format {
        ApiFormat::OpenAI | ApiFormat::Azure { .. } => {
            let messages: Vec<Value> = request.messages.iter().map(openai_message).collect();
            let mut body = json!({
                "messages": messages,
                "temperature": temperature,
                "max_tokens": max_tokens,
            });
            // Azure 通过 URL 中的 deployment 指定模型
            if matches!(format, ApiFormat::OpenAI) {
                body["model"] = json!(model);
            }
            if stream {
                body["stream"] = json!(true);
            }
            body
        }
        ApiFormat::Gemini => {
            let mut contents = Vec::new();
            let mut system_parts = Vec::new();
            for message in &request.messages {
                if message.role == Role::System {
                    system_parts.push(json!({ "text": message.text() }));
                    continue;
                }
                let role = match message.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                contents.push(json!({
                    "role": role,
                    "parts": gemini_parts(&message.parts),
                }));
            }
            let mut body = json!({
                "contents": contents,
                "generationConfig": {
                    "temperature": temperature,
                    "maxOutputTokens": max_tokens,
                },
            });
            if !system_parts.is_empty() {
                body["systemInstruction"] = json!({ "parts": system_parts });
            }
            body
        }
        ApiFormat::Completion => {
            let mut body = json!({
                "model": model,
                "prompt": flatten_prompt(&request.messages),
                "temperature": temperature,
                "max_tokens": max_tokens,
            });
            if stream {
                body["stream"] = json!(true);
            }
            body
        }
    }
}

fn openai_message(message: &ChatMessage) -> Value {
    let content = match message.parts.as_slice() {
        [ContentPart::Text { text }] => json!(text),
        parts => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                    ContentPart::ImageUrl { url } => {
                        json!({ "type": "image_url", "image_url": { "url": url } })
                    }
                })
                .collect(),
        ),
    };
    let mut value = json!({
        "role": message.role.as_str(),
        "content": content,
    });
    if let Some(name) = &message.name {
        value["name"] = json!(name);
    }
    value
}

fn gemini_parts(parts: &[ContentPart]) -> Vec<Value> {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(json!({ "text": text })),
            ContentPart::ImageUrl { url } => match split_data_url(url) {
                Some((mime, data)) => Some(json!({
                    "inline_data": { "mime_type": mime, "data": data }
                })),
                None => Some(json!({
                    "file_data": { "mime_type": "image/jpeg", "file_uri": url }
                })),
            },
        })
        .collect()
}

/// `data:image/png;base64,XXXX` → ("image/png", "XXXX")
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((mime, data))
}

/// 补全接口没有消息结构，按角色前缀拼成单个 prompt
pub fn flatten_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        if message.has_images() {
            warn!("completion endpoint does not accept images; dropping image parts");
        }
        let prefix = match message.role {
            Role::System => "System",
            Role::User => "Human",
            Role::Assistant => "AI",
        };
        prompt.push_str(prefix);
        prompt.push_str(": ");
        prompt.push_str(&message.text());
        prompt.push('\n');
    }
    prompt.push_str("AI:");
    prompt
}

pub fn extract_content(format: &ApiFormat, payload: &Value) -> Result<String> {
    let content = match format {
        ApiFormat::OpenAI | ApiFormat::Azure { .. } => payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string),
        ApiFormat::Completion => payload["choices"][0]["text"]
            .as_str()
            .map(|s| s.trim().to_string()),
        ApiFormat::Gemini => payload["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<String>()
            }),
    };

    content.ok_or_else(|| {
        let mut body = payload.to_string();
        if body.len() > 500 {
            let mut cut = 500;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push_str("...");
        }
        StormFlowError::Provider(format!("missing content in {format:?} response: {body}"))
    })
}

pub fn extract_usage(payload: &Value) -> Option<TokenUsage> {
    if let Some(usage) = payload.get("usage").filter(|u| u.is_object()) {
        let prompt_tokens = usage["prompt_tokens"].as_u64().unwrap_or_default();
        let completion_tokens = usage["completion_tokens"].as_u64().unwrap_or_default();
        return Some(TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: usage["total_tokens"]
                .as_u64()
                .unwrap_or(prompt_tokens + completion_tokens),
        });
    }
    if let Some(usage) = payload.get("usageMetadata").filter(|u| u.is_object()) {
        let prompt_tokens = usage["promptTokenCount"].as_u64().unwrap_or_default();
        let completion_tokens = usage["candidatesTokenCount"].as_u64().unwrap_or_default();
        return Some(TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: usage["totalTokenCount"]
                .as_u64()
                .unwrap_or(prompt_tokens + completion_tokens),
        });
    }
    None
}
