use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// 文本向量化
#[async_trait]
pub trait Embeddings: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        Ok(vectors.pop().unwrap_or_default())
    }
}

pub type DynEmbeddings = Arc<dyn Embeddings>;

const DEFAULT_DIMENSIONS: usize = 256;

/// 离线的特征哈希向量化，结果确定且无需网络
///
/// 每个小写词元哈希到一个桶，符号位由哈希的最高位决定，最后做 L2 归一化。
#[derive(Debug, Clone)]
pub struct HashingEmbeddings {
    dimensions: usize,
}

impl HashingEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for HashingEmbeddings {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embeddings for HashingEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

/// 字母数字按词切分，CJK 字符逐字切分
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if is_cjk(ch) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(ch.to_string());
        } else if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}

#[cfg(feature = "http-providers")]
pub use http::HttpEmbeddings;

#[cfg(feature = "http-providers")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tracing::instrument;

    use super::Embeddings;
    use crate::config::EnvConfig;
    use crate::error::{Result, StormFlowError};

    const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
    const DEFAULT_MODEL: &str = "text-embedding-3-small";

    /// OpenAI 兼容的 `/embeddings` 接口
    #[derive(Clone)]
    pub struct HttpEmbeddings {
        client: reqwest::Client,
        endpoint: String,
        api_key: String,
        model: String,
    }

    impl HttpEmbeddings {
        pub fn new(
            endpoint: impl Into<String>,
            api_key: impl Into<String>,
            model: impl Into<String>,
        ) -> Self {
            let client = reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new());
            Self {
                client,
                endpoint: endpoint.into().trim_end_matches('/').to_string(),
                api_key: api_key.into(),
                model: model.into(),
            }
        }

        /// 使用 `OPENAI_API_KEY` 与默认模型
        pub fn from_env() -> Result<Self> {
            let api_key = EnvConfig::get_api_key("", "OPENAI_API_KEY")?;
            let endpoint = EnvConfig::get_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
            Ok(Self::new(endpoint, api_key, DEFAULT_MODEL))
        }
    }

    #[async_trait]
    impl Embeddings for HttpEmbeddings {
        #[instrument(skip(self, texts), fields(model = %self.model, count = texts.len()))]
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let response = self
                .client
                .post(format!("{}/embeddings", self.endpoint))
                .bearer_auth(&self.api_key)
                .json(&json!({ "model": self.model, "input": texts }))
                .send()
                .await
                .map_err(|e| StormFlowError::Provider(format!("embedding request error: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(StormFlowError::Provider(format!(
                    "embedding request failed with status {status}: {text}"
                )));
            }
            let payload: Value = response
                .json()
                .await
                .map_err(|e| StormFlowError::Provider(format!("embedding parse error: {e}")))?;

            let mut rows: Vec<(u64, Vec<f32>)> = payload["data"]
                .as_array()
                .ok_or_else(|| StormFlowError::Parse("embedding response has no data".into()))?
                .iter()
                .map(|row| {
                    let index = row["index"].as_u64().unwrap_or_default();
                    let vector = row["embedding"]
                        .as_array()
                        .map(|values| {
                            values
                                .iter()
                                .filter_map(Value::as_f64)
                                .map(|v| v as f32)
                                .collect()
                        })
                        .unwrap_or_default();
                    (index, vector)
                })
                .collect();
            rows.sort_by_key(|(index, _)| *index);
            Ok(rows.into_iter().map(|(_, vector)| vector).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn hashing_is_deterministic_and_normalized() {
        let embeddings = HashingEmbeddings::new(64);
        let a = embeddings.embed("Rust ownership and borrowing");
        let b = embeddings.embed("rust OWNERSHIP and borrowing!");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embeddings = HashingEmbeddings::new(16);
        assert!(embeddings.embed("  ...  ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn tokenizer_splits_cjk_per_character() {
        assert_eq!(tokenize("Hello, 世界 v2"), vec!["hello", "世", "界", "v2"]);
    }

    #[tokio::test]
    async fn related_texts_score_higher() {
        let embeddings = HashingEmbeddings::default();
        let query = embeddings.embed_query("graph checkpoint storage").await.unwrap();
        let docs = embeddings
            .embed_documents(&[
                "checkpoint storage for graph runs".to_string(),
                "baking sourdough bread at home".to_string(),
            ])
            .await
            .unwrap();
        assert!(cosine(&query, &docs[0]) > cosine(&query, &docs[1]));
    }
}
