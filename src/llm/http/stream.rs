use crate::error::{Result, StormFlowError};
use crate::llm::types::ChatStreamChunk;
use serde_json::Value;

/// SSE (Server-Sent Events) 解析器
///
/// 以字节缓冲，避免多字节字符被网络分包截断。
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// 解析数据块，返回已完整到达的事件
    ///
    /// ```text
    /// data: {"choices":[{"delta":{"content":"Hello"}}]}
    ///
    /// data: [DONE]
    /// ```
    pub fn parse_chunk(&mut self, data: &[u8]) -> Result<Vec<ChatStreamChunk>> {
        self.buffer.extend_from_slice(data);

        let mut chunks = Vec::new();
        while let Some(end) = find_event_end(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end.0 + end.1).collect();
            let text = String::from_utf8_lossy(&event[..end.0]);
            for line in text.lines() {
                if let Some(chunk) = parse_line(line)? {
                    chunks.push(chunk);
                }
            }
        }
        Ok(chunks)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// 返回 (事件结束位置, 分隔符长度)
fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_line(line: &str) -> Result<Option<ChatStreamChunk>> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(ChatStreamChunk {
            content: String::new(),
            done: true,
        }));
    }

    let json: Value = serde_json::from_str(data)
        .map_err(|e| StormFlowError::Parse(format!("invalid SSE payload: {e}: {data}")))?;
    let content = extract_content_delta(&json);
    if content.is_empty() {
        Ok(None)
    } else {
        Ok(Some(ChatStreamChunk {
            content,
            done: false,
        }))
    }
}

/// 从 JSON 中提取增量文本
///
/// - OpenAI / Azure: choices[0].delta.content
/// - Together 补全: choices[0].text
/// - Gemini: candidates[0].content.parts[*].text
fn extract_content_delta(json: &Value) -> String {
    let choice = &json["choices"][0];
    if let Some(content) = choice["delta"]["content"].as_str() {
        return content.to_string();
    }
    if let Some(content) = choice["text"].as_str() {
        return content.to_string();
    }
    if let Some(parts) = json["candidates"][0]["content"]["parts"].as_array() {
        return parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<String>();
    }
    String::new()
}
