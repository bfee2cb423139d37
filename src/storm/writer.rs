use std::collections::BTreeMap;

use tracing::{info, instrument};

use super::models::WikiSection;
use super::prompts::{
    complete_json, complete_text, system_and_user, ARTICLE_SYSTEM, ARTICLE_USER, SECTION_SYSTEM,
    SECTION_USER,
};
use crate::error::Result;
use crate::llm::DynChatModel;
use crate::retrieval::{Document, InMemoryVectorStore};

/// 用访谈引用重建向量库
pub async fn index_references(
    store: &InMemoryVectorStore,
    references: &BTreeMap<String, String>,
) -> Result<usize> {
    store.clear();
    let documents = references
        .iter()
        .map(|(url, content)| Document::new(content.clone(), url.clone()))
        .collect();
    let indexed = store.add_documents(documents).await?;
    info!(indexed, "references indexed");
    Ok(indexed)
}

/// 章节检索使用 "{topic}: {section_title}"
pub fn section_query(topic: &str, section_title: &str) -> String {
    format!("{topic}: {section_title}")
}

#[instrument(skip(model, store, outline))]
pub async fn write_section(
    model: &DynChatModel,
    store: &InMemoryVectorStore,
    top_k: usize,
    topic: &str,
    outline: &str,
    section_title: &str,
) -> Result<WikiSection> {
    let docs = store
        .similarity_search(&section_query(topic, section_title), top_k)
        .await?
        .iter()
        .map(Document::as_reference)
        .collect::<Vec<_>>()
        .join("\n");
    let messages = system_and_user(
        SECTION_SYSTEM.render(&[("outline", outline), ("docs", &docs)])?,
        SECTION_USER.render(&[("section", section_title)])?,
    );
    complete_json(model, messages).await
}

/// 章节草稿以空行拼接
pub fn draft_from_sections(sections: &[WikiSection]) -> String {
    sections
        .iter()
        .map(WikiSection::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[instrument(skip(model, sections), fields(sections = sections.len()))]
pub async fn write_article(
    model: &DynChatModel,
    topic: &str,
    sections: &[WikiSection],
) -> Result<String> {
    let draft = draft_from_sections(sections);
    let messages = system_and_user(
        ARTICLE_SYSTEM.render(&[("topic", topic), ("draft", &draft)])?,
        ARTICLE_USER.render(&[])?,
    );
    complete_text(model, messages).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::retrieval::HashingEmbeddings;

    #[tokio::test]
    async fn indexing_replaces_previous_references() {
        let store = InMemoryVectorStore::new(Arc::new(HashingEmbeddings::default()));
        let mut refs = BTreeMap::new();
        refs.insert("https://a".to_string(), "alpha".to_string());
        refs.insert("https://b".to_string(), "beta".to_string());
        assert_eq!(index_references(&store, &refs).await.unwrap(), 2);

        refs.remove("https://a");
        assert_eq!(index_references(&store, &refs).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn draft_joins_sections_with_blank_lines() {
        let section = |title: &str| WikiSection {
            section_title: title.into(),
            content: "body".into(),
            subsections: vec![],
            citations: vec![],
        };
        assert_eq!(
            draft_from_sections(&[section("A"), section("B")]),
            "## A\n\nbody\n\n## B\n\nbody"
        );
        assert_eq!(section_query("Rust", "History"), "Rust: History");
    }
}
