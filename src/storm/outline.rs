use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use super::models::{Editor, InterviewState, Outline, Perspectives, RelatedSubjects};
use super::prompts::{
    complete_json, system_and_user, OUTLINE_SYSTEM, OUTLINE_USER, PERSPECTIVES_SYSTEM,
    PERSPECTIVES_USER, REFINE_SYSTEM, REFINE_USER, RELATED_SUBJECTS,
};
use crate::error::Result;
use crate::llm::{ChatMessage, DynChatModel};
use crate::retrieval::DynSearchEngine;

/// 参考页面内容截断长度
const EXAMPLE_MAX_CHARS: usize = 1000;

#[instrument(skip(model))]
pub async fn generate_initial_outline(model: &DynChatModel, topic: &str) -> Result<Outline> {
    let messages = system_and_user(
        OUTLINE_SYSTEM.render(&[])?,
        OUTLINE_USER.render(&[("topic", topic)])?,
    );
    let outline: Outline = complete_json(model, messages).await?;
    info!(sections = outline.sections.len(), "initial outline generated");
    Ok(outline)
}

/// 相关主题 → 搜索参考页面 → 生成多视角编辑
#[instrument(skip(model, search))]
pub async fn survey_subjects(
    model: &DynChatModel,
    search: &DynSearchEngine,
    topic: &str,
    max_editors: usize,
) -> Result<Vec<Editor>> {
    let related: RelatedSubjects = complete_json(
        model,
        vec![ChatMessage::user(RELATED_SUBJECTS.render(&[("topic", topic)])?)],
    )
    .await?;
    debug!(topics = ?related.topics, "related subjects");

    let lookups = related.topics.iter().map(|subject| async move {
        match search.search(subject, 1).await {
            Ok(results) => results
                .into_iter()
                .map(|r| {
                    let content: String = r.content.chars().take(EXAMPLE_MAX_CHARS).collect();
                    format!("### {}\n\n{content}", r.url)
                })
                .collect::<Vec<_>>(),
            // 参考页面只是灵感来源，查不到不影响后续
            Err(e) => {
                warn!(subject = %subject, error = %e, "related subject lookup failed");
                Vec::new()
            }
        }
    });
    let examples = join_all(lookups)
        .await
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n\n");

    let messages = system_and_user(
        PERSPECTIVES_SYSTEM.render(&[("examples", &examples)])?,
        PERSPECTIVES_USER.render(&[("topic", topic)])?,
    );
    let perspectives: Perspectives = complete_json(model, messages).await?;
    let editors: Vec<Editor> = perspectives
        .editors
        .into_iter()
        .map(Editor::sanitized)
        .take(max_editors)
        .collect();
    info!(editors = editors.len(), "perspectives selected");
    Ok(editors)
}

/// 各场访谈之间以空行分隔
pub fn format_conversations(interviews: &[InterviewState]) -> String {
    interviews
        .iter()
        .map(InterviewState::format_conversation)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[instrument(skip(model, old_outline, interviews), fields(interviews = interviews.len()))]
pub async fn refine_outline(
    model: &DynChatModel,
    topic: &str,
    old_outline: &Outline,
    interviews: &[InterviewState],
) -> Result<Outline> {
    let old_outline = old_outline.as_str();
    let conversations = format_conversations(interviews);
    let messages = system_and_user(
        REFINE_SYSTEM.render(&[("topic", topic), ("old_outline", &old_outline)])?,
        REFINE_USER.render(&[("conversations", &conversations)])?,
    );
    let outline: Outline = complete_json(model, messages).await?;
    info!(sections = outline.sections.len(), "outline refined");
    Ok(outline)
}
