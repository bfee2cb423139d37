//! HTTP 客户端实现
//!
//! - `GenericHttpClient`: 统一的聊天客户端，按 `ApiFormat` 适配 OpenAI / Azure / Gemini / 补全接口
//! - `SseParser`: 流式响应解析
//! - `wire`: 请求体构建与响应解析

pub mod stream;
pub mod wire;

#[cfg(feature = "http-providers")]
pub mod generic;

#[cfg(feature = "http-providers")]
pub use generic::GenericHttpClient;
pub use stream::SseParser;
