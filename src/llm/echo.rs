use std::sync::Arc;

use async_trait::async_trait;

use super::client::{ChatModel, DynChatModel};
use super::types::{ChatRequest, ChatResponse};
use crate::error::Result;

/// 本地回显客户端，用于无网络的试运行
#[derive(Default, Clone)]
pub struct LocalEchoClient;

#[async_trait]
impl ChatModel for LocalEchoClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let text = request.last_user_text().unwrap_or_default();
        Ok(ChatResponse::text(format!("[Echo] {text}")))
    }

    fn model_name(&self) -> &str {
        "echo"
    }

    fn clone_dyn(&self) -> DynChatModel {
        Arc::new(LocalEchoClient)
    }
}
