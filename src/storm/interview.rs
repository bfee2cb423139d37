use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use super::models::{
    sanitize_name, AnswerWithCitations, InterviewMessage, InterviewRole, InterviewState, Queries,
};
use super::prompts::{complete_json, complete_text, ANSWER_SYSTEM, QUERIES_SYSTEM, QUESTION_SYSTEM};
use crate::error::Result;
use crate::graph::{node_fn, router_from_fn, CompiledGraph, StateGraph, END, START};
use crate::llm::{ChatMessage, DynChatModel};
use crate::retrieval::DynSearchEngine;

pub const ASK_QUESTION: &str = "ask_question";
pub const ANSWER_QUESTION: &str = "answer_question";
pub const END_OF_INTERVIEW: &str = "Thank you so much for your help!";

/// 访谈节点共享的依赖
pub struct Interviewer {
    model: DynChatModel,
    search: DynSearchEngine,
    max_turns: usize,
    search_max_results: usize,
}

impl Interviewer {
    pub fn new(
        model: DynChatModel,
        search: DynSearchEngine,
        max_turns: usize,
        search_max_results: usize,
    ) -> Self {
        Self {
            model,
            search,
            max_turns,
            search_max_results,
        }
    }

    /// 以 `perspective` 为"自己"，其余发言者视为对方
    fn conversation(state: &InterviewState, perspective: InterviewRole) -> Vec<ChatMessage> {
        state
            .messages
            .iter()
            .map(|m| {
                let message = if m.role == perspective {
                    ChatMessage::assistant(m.content.clone())
                } else {
                    ChatMessage::user(m.content.clone())
                };
                message.with_name(m.name.clone())
            })
            .collect()
    }

    #[instrument(skip(self, state), fields(editor = %state.editor.name))]
    pub async fn ask_question(&self, mut state: InterviewState) -> Result<InterviewState> {
        let name = sanitize_name(&state.editor.name);
        let mut messages = vec![ChatMessage::system(
            QUESTION_SYSTEM.render(&[("persona", &state.editor.persona())])?,
        )];
        messages.extend(Self::conversation(&state, InterviewRole::Editor));

        let question = complete_text(&self.model, messages).await?;
        debug!(question = %question, "editor asked");
        state.messages.push(InterviewMessage::editor(&name, question));
        Ok(state)
    }

    async fn run_queries(&self, queries: &[String]) -> BTreeMap<String, String> {
        let searches = queries.iter().map(|query| async move {
            match self.search.search(query, self.search_max_results).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(query = %query, error = %e, "search failed");
                    Vec::new()
                }
            }
        });
        join_all(searches)
            .await
            .into_iter()
            .flatten()
            .map(|r| (r.url, r.content))
            .collect()
    }

    #[instrument(skip(self, state), fields(editor = %state.editor.name))]
    pub async fn answer_question(&self, mut state: InterviewState) -> Result<InterviewState> {
        let conversation = Self::conversation(&state, InterviewRole::Expert);

        let mut messages = vec![ChatMessage::system(QUERIES_SYSTEM.render(&[])?)];
        messages.extend(conversation.iter().cloned());
        let queries: Queries = complete_json(&self.model, messages).await?;
        debug!(queries = ?queries.queries, "search queries generated");

        let results = self.run_queries(&queries.queries).await;
        let gathered = if results.is_empty() {
            "No search results.".to_string()
        } else {
            results
                .iter()
                .map(|(url, content)| format!("### {url}\n\n{content}"))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let mut messages = vec![ChatMessage::system(
            ANSWER_SYSTEM.render(&[("results", &gathered)])?,
        )];
        messages.extend(conversation);
        let answer: AnswerWithCitations = complete_json(&self.model, messages).await?;

        for url in &answer.cited_urls {
            if let Some(content) = results.get(url) {
                state.references.insert(url.clone(), content.clone());
            }
        }
        state.messages.push(InterviewMessage::expert(answer.as_str()));
        Ok(state)
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}

/// 专家回答满 `max_turns` 次，或编辑道谢后结束
pub fn route_messages(state: &InterviewState, max_turns: usize) -> String {
    if state.expert_turns() >= max_turns {
        return END.to_string();
    }
    let last_question = state
        .messages
        .iter()
        .rev()
        .find(|m| m.role == InterviewRole::Editor);
    match last_question {
        Some(question) if question.content.trim_end().ends_with(END_OF_INTERVIEW) => {
            END.to_string()
        }
        _ => ASK_QUESTION.to_string(),
    }
}

/// ask_question → answer_question → (ask_question | END)
pub fn build_interview_graph(interviewer: Arc<Interviewer>) -> Result<CompiledGraph<InterviewState>> {
    let mut builder = StateGraph::<InterviewState>::new("interview");

    let ask = Arc::clone(&interviewer);
    builder.add_node(
        ASK_QUESTION,
        node_fn(move |state: InterviewState| {
            let ask = Arc::clone(&ask);
            async move { ask.ask_question(state).await }
        }),
    );
    let answer = Arc::clone(&interviewer);
    builder.add_node(
        ANSWER_QUESTION,
        node_fn(move |state: InterviewState| {
            let answer = Arc::clone(&answer);
            async move { answer.answer_question(state).await }
        }),
    );

    let max_turns = interviewer.max_turns();
    builder
        .add_edge(START, ASK_QUESTION)
        .add_edge(ASK_QUESTION, ANSWER_QUESTION)
        .add_conditional_edges(
            ANSWER_QUESTION,
            router_from_fn(move |state: &InterviewState| route_messages(state, max_turns)),
            &[ASK_QUESTION, END],
        );

    builder.compile(None)
}
