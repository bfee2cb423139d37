use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::client::{ChatModel, DynChatModel};
use super::types::{ChatRequest, ChatResponse, TokenUsage};
use crate::error::Result;

/// 每千 token 的美元价格（输入, 输出），按前缀匹配，越具体越靠前
const PRICE_TABLE: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.000_15, 0.000_6),
    ("gpt-4o", 0.002_5, 0.01),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-4", 0.03, 0.06),
    ("gpt-3.5-turbo", 0.000_5, 0.001_5),
    ("o1-mini", 0.003, 0.012),
    ("o1", 0.015, 0.06),
];

/// 估算一次调用的费用；未知模型返回 0
pub fn estimate_cost(model: &str, usage: &TokenUsage) -> f64 {
    let model = model.rsplit('/').next().unwrap_or(model);
    PRICE_TABLE
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| {
            usage.prompt_tokens as f64 / 1000.0 * input
                + usage.completion_tokens as f64 / 1000.0 * output
        })
        .unwrap_or(0.0)
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UsageSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub successful_requests: u64,
    pub total_cost: f64,
}

impl fmt::Display for UsageSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tokens Used: {}", self.total_tokens)?;
        writeln!(f, "\tPrompt Tokens: {}", self.prompt_tokens)?;
        writeln!(f, "\tCompletion Tokens: {}", self.completion_tokens)?;
        writeln!(f, "Successful Requests: {}", self.successful_requests)?;
        write!(f, "Total Cost (USD): ${:.6}", self.total_cost)
    }
}

/// 线程安全的 token / 费用累加器
#[derive(Default)]
pub struct UsageTracker {
    inner: Mutex<UsageSnapshot>,
}

impl UsageTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, model: &str, usage: Option<&TokenUsage>) {
        let mut snapshot = self.inner.lock();
        snapshot.successful_requests += 1;
        if let Some(usage) = usage {
            snapshot.prompt_tokens += usage.prompt_tokens;
            snapshot.completion_tokens += usage.completion_tokens;
            snapshot.total_tokens += usage.total_tokens;
            snapshot.total_cost += estimate_cost(model, usage);
        }
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        *self.inner.lock()
    }

    pub fn reset(&self) {
        *self.inner.lock() = UsageSnapshot::default();
    }
}

/// 包装任意模型，把每次成功响应记入共享的 `UsageTracker`
#[derive(Clone)]
pub struct TrackedModel {
    inner: DynChatModel,
    tracker: Arc<UsageTracker>,
}

impl TrackedModel {
    pub fn new(inner: DynChatModel, tracker: Arc<UsageTracker>) -> Self {
        Self { inner, tracker }
    }

    pub fn tracker(&self) -> Arc<UsageTracker> {
        Arc::clone(&self.tracker)
    }
}

#[async_trait]
impl ChatModel for TrackedModel {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let response = self.inner.complete(request).await?;
        let model = response
            .model
            .clone()
            .unwrap_or_else(|| self.inner.model_name().to_string());
        self.tracker.record(&model, response.usage.as_ref());
        debug!(model = %model, usage = ?response.usage, "recorded usage");
        Ok(response)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn clone_dyn(&self) -> DynChatModel {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_uses_most_specific_prefix() {
        let usage = TokenUsage {
            prompt_tokens: 1000,
            completion_tokens: 1000,
            total_tokens: 2000,
        };
        let mini = estimate_cost("gpt-4o-mini", &usage);
        assert!((mini - 0.000_75).abs() < 1e-9);
        let routed = estimate_cost("openai/gpt-4o", &usage);
        assert!((routed - 0.012_5).abs() < 1e-9);
        assert_eq!(estimate_cost("llama-3-70b", &usage), 0.0);
    }

    #[test]
    fn tracker_accumulates_and_resets() {
        let tracker = UsageTracker::new();
        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        tracker.record("gpt-4o", Some(&usage));
        tracker.record("gpt-4o", None);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.successful_requests, 2);
        assert_eq!(snapshot.total_tokens, 15);
        assert!(snapshot.to_string().contains("Prompt Tokens: 10"));

        tracker.reset();
        assert_eq!(tracker.snapshot(), UsageSnapshot::default());
    }
}
