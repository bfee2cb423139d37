use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 一条搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub content: String,
}

/// 网页搜索引擎
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

pub type DynSearchEngine = Arc<dyn SearchEngine>;

/// 不做任何搜索，专家只能依靠模型自身知识作答
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSearch;

#[async_trait]
impl SearchEngine for NoSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }
}

#[cfg(feature = "http-providers")]
pub use tavily::TavilySearch;

#[cfg(feature = "http-providers")]
mod tavily {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use tracing::instrument;

    use super::{SearchEngine, SearchResult};
    use crate::config::EnvConfig;
    use crate::error::{Result, StormFlowError};

    const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

    #[derive(Deserialize)]
    struct TavilyResponse {
        #[serde(default)]
        results: Vec<SearchResult>,
    }

    /// Tavily 搜索 API
    #[derive(Clone)]
    pub struct TavilySearch {
        client: reqwest::Client,
        api_key: String,
    }

    impl TavilySearch {
        pub fn new(api_key: impl Into<String>) -> Self {
            let client = reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new());
            Self {
                client,
                api_key: api_key.into(),
            }
        }

        /// 读取 `TAVILY_API_KEY`
        pub fn from_env() -> Result<Self> {
            Ok(Self::new(EnvConfig::get_env("TAVILY_API_KEY")?))
        }
    }

    #[async_trait]
    impl SearchEngine for TavilySearch {
        #[instrument(skip(self))]
        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
            let response = self
                .client
                .post(TAVILY_ENDPOINT)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": max_results,
                }))
                .send()
                .await
                .map_err(|e| StormFlowError::Provider(format!("search request error: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(StormFlowError::Provider(format!(
                    "search failed with status {status}: {text}"
                )));
            }
            let body: TavilyResponse = response
                .json()
                .await
                .map_err(|e| StormFlowError::Provider(format!("search parse error: {e}")))?;
            Ok(body.results.into_iter().take(max_results).collect())
        }
    }
}
