use std::cmp::Ordering;

use parking_lot::RwLock;
use tracing::debug;

use super::document::Document;
use super::embeddings::DynEmbeddings;
use crate::error::Result;

struct Entry {
    document: Document,
    vector: Vec<f32>,
}

/// 进程内向量库，按余弦相似度检索
pub struct InMemoryVectorStore {
    embeddings: DynEmbeddings,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryVectorStore {
    pub fn new(embeddings: DynEmbeddings) -> Self {
        Self {
            embeddings,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let vectors = self.embeddings.embed_documents(&texts).await?;
        let added = documents.len().min(vectors.len());
        self.entries.write().extend(
            documents
                .into_iter()
                .zip(vectors)
                .map(|(document, vector)| Entry { document, vector }),
        );
        debug!(added, total = self.len(), "documents indexed");
        Ok(added)
    }

    /// 返回最相近的 `k` 个文档，相似度从高到低
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        Ok(self
            .similarity_search_with_score(query, k)
            .await?
            .into_iter()
            .map(|(document, _)| document)
            .collect())
    }

    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(Document, f32)>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embeddings.embed_query(query).await?;
        let entries = self.entries.read();
        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (index, cosine_similarity(&query, &entry.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(index, score)| (entries[index].document.clone(), score))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
