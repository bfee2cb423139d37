use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, instrument};

use super::convert::ChineseConverter;
use super::output::StrOutputParser;
use super::prompt::ChatPromptTemplate;
use crate::error::Result;
use crate::llm::{
    ChatMessage, ChatRequest, ChatStream, ChatStreamChunk, DynChatModel, TrackedModel,
    UsageSnapshot, UsageTracker,
};

/// prompt → 模型 → 字符串输出 → 可选的字形转换
#[derive(Clone)]
pub struct Chain {
    prompt: ChatPromptTemplate,
    model: DynChatModel,
    parser: StrOutputParser,
    converter: Option<Arc<ChineseConverter>>,
}

/// 默认在输出端做简体 → 香港繁体转换
pub fn create_chain(prompt: ChatPromptTemplate, model: DynChatModel) -> Chain {
    Chain {
        prompt,
        model,
        parser: StrOutputParser,
        converter: Some(Arc::new(ChineseConverter::s2hk())),
    }
}

impl Chain {
    pub fn with_converter(mut self, converter: ChineseConverter) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    pub fn without_conversion(mut self) -> Self {
        self.converter = None;
        self
    }

    pub fn prompt(&self) -> &ChatPromptTemplate {
        &self.prompt
    }

    fn request(&self, history: &[ChatMessage]) -> ChatRequest {
        ChatRequest::new(self.prompt.format_messages(history))
    }

    fn finish(&self, content: &str) -> String {
        let text = self.parser.parse(content);
        match &self.converter {
            Some(converter) => converter.convert(&text),
            None => text,
        }
    }

    pub async fn invoke(&self, history: &[ChatMessage]) -> Result<String> {
        let response = self.model.complete(self.request(history)).await?;
        Ok(self.finish(&response.content))
    }

    /// 逐块输出；转换按块进行，跨块的词组退化为逐字转换
    pub fn stream(&self, history: &[ChatMessage]) -> ChatStream {
        let converter = self.converter.clone();
        let stream = self.model.complete_stream(self.request(history));
        Box::pin(stream.map(move |chunk| {
            chunk.map(|chunk| ChatStreamChunk {
                content: match &converter {
                    Some(converter) => converter.convert(&chunk.content),
                    None => chunk.content,
                },
                done: chunk.done,
            })
        }))
    }
}

/// 调用链并统计本次调用的 token 与费用
#[instrument(skip(chain, history), fields(model = %chain.model.model_name()))]
pub async fn invoke_chain(chain: &Chain, history: &[ChatMessage]) -> Result<(String, UsageSnapshot)> {
    let tracker = UsageTracker::new();
    let tracked = Chain {
        model: Arc::new(TrackedModel::new(
            Arc::clone(&chain.model),
            Arc::clone(&tracker),
        )),
        ..chain.clone()
    };
    let output = tracked.invoke(history).await?;
    let usage = tracker.snapshot();
    info!(
        total_tokens = usage.total_tokens,
        cost_usd = usage.total_cost,
        "chain invocation finished"
    );
    Ok((output, usage))
}
