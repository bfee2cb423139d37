use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use super::types::{ChatRequest, ChatResponse, ChatStream, ChatStreamChunk};
use crate::error::Result;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;

    fn model_name(&self) -> &str;

    /// 默认实现：完整请求后按字符切分输出
    fn complete_stream(&self, request: ChatRequest) -> ChatStream {
        let client = self.clone_dyn();

        Box::pin(
            futures::stream::once(async move { client.complete(request).await })
                .flat_map(|result| {
                    let chunks: Vec<Result<ChatStreamChunk>> = match result {
                        Ok(response) => response
                            .content
                            .chars()
                            .map(|ch| {
                                Ok(ChatStreamChunk {
                                    content: ch.to_string(),
                                    done: false,
                                })
                            })
                            .collect(),
                        Err(e) => vec![Err(e)],
                    };
                    futures::stream::iter(chunks)
                })
                .chain(futures::stream::once(async {
                    Ok(ChatStreamChunk {
                        content: String::new(),
                        done: true,
                    })
                })),
        )
    }

    fn clone_dyn(&self) -> DynChatModel;
}

pub type DynChatModel = Arc<dyn ChatModel>;
