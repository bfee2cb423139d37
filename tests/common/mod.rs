#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use stormflow::llm::{ChatModel, ChatRequest, ChatResponse, DynChatModel, Role, TokenUsage};

type Responder = Arc<dyn Fn(&ChatRequest) -> String + Send + Sync>;

/// 离线脚本模型：按请求内容生成回复，并记录所有请求
#[derive(Clone)]
pub struct ScriptedModel {
    name: String,
    responder: Responder,
    usage: Option<TokenUsage>,
    calls: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedModel {
    pub fn new<F>(name: &str, responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            responder: Arc::new(responder),
            usage: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.usage = Some(TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        });
        self
    }

    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().clone()
    }

    pub fn shared(&self) -> DynChatModel {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: ChatRequest) -> stormflow::Result<ChatResponse> {
        let content = (self.responder)(&request);
        self.calls.lock().push(request);
        Ok(ChatResponse {
            content,
            usage: self.usage,
            model: Some(self.name.clone()),
            metadata: None,
        })
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn clone_dyn(&self) -> DynChatModel {
        Arc::new(self.clone())
    }
}

/// 请求中的系统提示（没有则为空）
pub fn system_text(request: &ChatRequest) -> String {
    request
        .messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.text())
        .unwrap_or_default()
}

/// 所有消息文本拼接，便于按关键字匹配
pub fn all_text(request: &ChatRequest) -> String {
    request
        .messages
        .iter()
        .map(|m| m.text())
        .collect::<Vec<_>>()
        .join("\n")
}
