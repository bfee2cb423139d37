// LLM 模块：聊天模型抽象、提供商选择与用量统计

pub mod client;
pub mod echo;
pub mod http;
pub mod provider;
pub mod types;
pub mod usage;

pub use client::{ChatModel, DynChatModel};
pub use echo::LocalEchoClient;
#[cfg(feature = "http-providers")]
pub use http::GenericHttpClient;
pub use provider::{parse_provider, select_model, ModelProvider, ModelSpec};
pub use types::{
    ApiFormat, ChatMessage, ChatRequest, ChatResponse, ChatStream, ChatStreamChunk, ContentPart,
    Role, TokenUsage,
};
pub use usage::{estimate_cost, TrackedModel, UsageSnapshot, UsageTracker};
