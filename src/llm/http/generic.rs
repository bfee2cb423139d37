use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, instrument};

use super::stream::SseParser;
use super::wire::{build_body, extract_content, extract_usage, Sampling};
use crate::error::{Result, StormFlowError};
use crate::llm::client::{ChatModel, DynChatModel};
use crate::llm::provider::ModelSpec;
use crate::llm::types::{ApiFormat, ChatRequest, ChatResponse, ChatStream, ChatStreamChunk};

/// 统一的 HTTP 聊天客户端，按 `ApiFormat` 适配各提供商
#[derive(Clone)]
pub struct GenericHttpClient {
    client: reqwest::Client,
    spec: Arc<ModelSpec>,
}

impl GenericHttpClient {
    fn create_client() -> reqwest::Client {
        reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    }

    pub fn new(spec: ModelSpec) -> Self {
        Self {
            client: Self::create_client(),
            spec: Arc::new(spec),
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn url(&self, stream: bool) -> String {
        let base = &self.spec.endpoint;
        match &self.spec.format {
            ApiFormat::OpenAI => format!("{base}/chat/completions"),
            ApiFormat::Azure { api_version } => format!(
                "{base}/openai/deployments/{}/chat/completions?api-version={api_version}",
                self.spec.model
            ),
            ApiFormat::Gemini if stream => {
                format!("{base}/{}:streamGenerateContent?alt=sse", self.spec.model)
            }
            ApiFormat::Gemini => format!("{base}/{}:generateContent", self.spec.model),
            ApiFormat::Completion => format!("{base}/completions"),
        }
    }

    fn sampling(&self) -> Sampling {
        Sampling {
            temperature: self.spec.temperature,
            max_tokens: self.spec.max_tokens,
        }
    }

    async fn send(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response> {
        let body = build_body(
            &self.spec.format,
            &self.spec.model,
            request,
            &self.sampling(),
            stream,
        );
        let url = self.url(stream);

        let builder = self.client.post(&url).json(&body);
        let builder = match &self.spec.format {
            ApiFormat::Azure { .. } => builder.header("api-key", &self.spec.api_key),
            ApiFormat::Gemini => builder.header("x-goog-api-key", &self.spec.api_key),
            ApiFormat::OpenAI | ApiFormat::Completion => builder.bearer_auth(&self.spec.api_key),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| StormFlowError::Provider(format!("HTTP request error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text: String = text.chars().take(500).collect();
            return Err(StormFlowError::Provider(format!(
                "request to {} failed with status {status}: {text}",
                self.spec.provider
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatModel for GenericHttpClient {
    #[instrument(skip(self, request), fields(provider = %self.spec.provider, model = %self.spec.model))]
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let response = self.send(&request, false).await?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| StormFlowError::Provider(format!("response parse error: {e}")))?;

        let content = extract_content(&self.spec.format, &payload)?;
        let usage = extract_usage(&payload);
        debug!(usage = ?usage, "chat completion finished");

        Ok(ChatResponse {
            content,
            usage,
            model: payload["model"]
                .as_str()
                .map(str::to_string)
                .or_else(|| Some(self.spec.model.clone())),
            metadata: Some(payload),
        })
    }

    fn model_name(&self) -> &str {
        &self.spec.model
    }

    /// 真正的 SSE 流式响应
    fn complete_stream(&self, request: ChatRequest) -> ChatStream {
        let client = self.clone();

        let state = StreamState::Pending { client, request };
        Box::pin(futures::stream::unfold(state, |state| async move {
            let (mut bytes, mut parser, mut queued) = match state {
                StreamState::Pending { client, request } => {
                    match client.send(&request, true).await {
                        Ok(response) => (
                            Box::pin(response.bytes_stream()) as ByteStream,
                            SseParser::new(),
                            VecDeque::new(),
                        ),
                        Err(e) => return Some((Err(e), StreamState::Finished)),
                    }
                }
                StreamState::Reading {
                    bytes,
                    parser,
                    queued,
                } => (bytes, parser, queued),
                StreamState::Finished => return None,
            };

            loop {
                if let Some(chunk) = queued.pop_front() {
                    let next = if chunk.done {
                        StreamState::Finished
                    } else {
                        StreamState::Reading {
                            bytes,
                            parser,
                            queued,
                        }
                    };
                    return Some((Ok(chunk), next));
                }
                match bytes.next().await {
                    Some(Ok(data)) => match parser.parse_chunk(&data) {
                        Ok(chunks) => queued.extend(chunks),
                        Err(e) => return Some((Err(e), StreamState::Finished)),
                    },
                    Some(Err(e)) => {
                        return Some((
                            Err(StormFlowError::Provider(format!("stream error: {e}"))),
                            StreamState::Finished,
                        ))
                    }
                    // Gemini 不发送 [DONE]
                    None => {
                        return Some((
                            Ok(ChatStreamChunk {
                                content: String::new(),
                                done: true,
                            }),
                            StreamState::Finished,
                        ))
                    }
                }
            }
        }))
    }

    fn clone_dyn(&self) -> DynChatModel {
        Arc::new(self.clone())
    }
}

type ByteStream =
    std::pin::Pin<Box<dyn futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>;

enum StreamState {
    Pending {
        client: GenericHttpClient,
        request: ChatRequest,
    },
    Reading {
        bytes: ByteStream,
        parser: SseParser,
        queued: VecDeque<ChatStreamChunk>,
    },
    Finished,
}
