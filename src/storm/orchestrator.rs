use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, instrument};

use super::interview::{build_interview_graph, Interviewer};
use super::models::{InterviewState, Outline, ResearchState, WikiSection};
use super::outline::{generate_initial_outline, refine_outline, survey_subjects};
use super::writer::{index_references, write_article, write_section};
use crate::config::StormConfig;
use crate::error::{Result, StormFlowError};
use crate::graph::{
    node_fn, CompiledGraph, DynCheckpointer, DynGraphNode, GraphEvent, RunnableConfig, StateGraph,
};
use crate::llm::DynChatModel;
use crate::retrieval::{
    DynEmbeddings, DynSearchEngine, HashingEmbeddings, InMemoryVectorStore, NoSearch,
};

pub const DEFAULT_THREAD_ID: &str = "my-thread";

pub const INIT_RESEARCH: &str = "init_research";
pub const CONDUCT_INTERVIEWS: &str = "conduct_interviews";
pub const REFINE_OUTLINE: &str = "refine_outline";
pub const INDEX_REFERENCES: &str = "index_references";
pub const WRITE_SECTIONS: &str = "write_sections";
pub const WRITE_ARTICLE: &str = "write_article";

/// 各阶段共享的依赖
struct StormContext {
    fast_model: DynChatModel,
    long_context_model: DynChatModel,
    interviews: CompiledGraph<InterviewState>,
    embeddings: DynEmbeddings,
    search: DynSearchEngine,
    config: StormConfig,
}

fn missing(stage: &str, field: &str) -> StormFlowError {
    StormFlowError::Config(format!("`{stage}` requires `{field}` from an earlier stage"))
}

impl StormContext {
    async fn init_research(&self, mut state: ResearchState) -> Result<ResearchState> {
        let (outline, editors) = tokio::try_join!(
            generate_initial_outline(&self.fast_model, &state.topic),
            survey_subjects(
                &self.fast_model,
                &self.search,
                &state.topic,
                self.config.max_editors
            ),
        )?;
        state.outline = Some(outline);
        state.editors = editors;
        Ok(state)
    }

    async fn conduct_interviews(&self, mut state: ResearchState) -> Result<ResearchState> {
        let initial: Vec<InterviewState> = state
            .editors
            .iter()
            .cloned()
            .map(|editor| InterviewState::opening(editor, &state.topic))
            .collect();
        // 每轮两个节点，外加余量
        let max_steps = (self.config.max_interview_turns * 2 + 2) as u32;
        let config = RunnableConfig::new(format!("{}:interviews", state.topic)).with_max_steps(max_steps);
        state.interview_results = self
            .interviews
            .batch(initial, &config, self.config.max_concurrency)
            .await?;
        info!(interviews = state.interview_results.len(), "interviews finished");
        Ok(state)
    }

    async fn refine_outline(&self, mut state: ResearchState) -> Result<ResearchState> {
        let old = state
            .outline
            .as_ref()
            .ok_or_else(|| missing(REFINE_OUTLINE, "outline"))?;
        let refined = refine_outline(
            &self.long_context_model,
            &state.topic,
            old,
            &state.interview_results,
        )
        .await?;
        state.outline = Some(refined);
        Ok(state)
    }

    async fn index_references(&self, mut state: ResearchState) -> Result<ResearchState> {
        state.references = merge_references(&state.interview_results);
        info!(references = state.references.len(), "references merged");
        Ok(state)
    }

    async fn write_sections(&self, mut state: ResearchState) -> Result<ResearchState> {
        let outline: Outline = state
            .outline
            .clone()
            .ok_or_else(|| missing(WRITE_SECTIONS, "outline"))?;
        // 向量库随运行状态重建，不同线程互不影响
        let store = InMemoryVectorStore::new(Arc::clone(&self.embeddings));
        index_references(&store, &state.references).await?;

        let outline_str = outline.as_str();
        let topic = state.topic.as_str();
        let pending: Vec<_> = outline
            .sections
            .iter()
            .map(|section| {
                write_section(
                    &self.long_context_model,
                    &store,
                    self.config.retrieval_top_k,
                    topic,
                    &outline_str,
                    &section.section_title,
                )
            })
            .collect();
        let sections: Vec<WikiSection> = stream::iter(pending)
            .buffered(self.config.max_concurrency.max(1))
            .try_collect()
            .await?;
        state.sections = sections;
        Ok(state)
    }

    async fn write_article(&self, mut state: ResearchState) -> Result<ResearchState> {
        let article = write_article(&self.long_context_model, &state.topic, &state.sections).await?;
        state.article = Some(article);
        Ok(state)
    }
}

/// 合并所有访谈的引用，同一 url 以后出现的为准
pub fn merge_references(interviews: &[InterviewState]) -> BTreeMap<String, String> {
    interviews
        .iter()
        .flat_map(|interview| interview.references.clone())
        .collect()
}

fn stage_node<F, Fut>(context: &Arc<StormContext>, stage: F) -> DynGraphNode<ResearchState>
where
    F: Fn(Arc<StormContext>, ResearchState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResearchState>> + Send + 'static,
{
    let context = Arc::clone(context);
    node_fn(move |state: ResearchState| stage(Arc::clone(&context), state))
}

/// 文章生成器
pub struct Storm {
    graph: CompiledGraph<ResearchState>,
    context: Arc<StormContext>,
}

pub struct StormBuilder {
    fast_model: DynChatModel,
    long_context_model: Option<DynChatModel>,
    search: DynSearchEngine,
    embeddings: DynEmbeddings,
    checkpointer: Option<DynCheckpointer>,
    config: StormConfig,
}

impl StormBuilder {
    /// 长文本模型，用于大纲精修和写作；默认与快速模型相同
    pub fn long_context_model(mut self, model: DynChatModel) -> Self {
        self.long_context_model = Some(model);
        self
    }

    pub fn search(mut self, search: DynSearchEngine) -> Self {
        self.search = search;
        self
    }

    pub fn embeddings(mut self, embeddings: DynEmbeddings) -> Self {
        self.embeddings = embeddings;
        self
    }

    pub fn checkpointer(mut self, checkpointer: DynCheckpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn config(mut self, config: StormConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Storm> {
        self.config.validate()?;
        let interviewer = Interviewer::new(
            Arc::clone(&self.fast_model),
            Arc::clone(&self.search),
            self.config.max_interview_turns,
            self.config.search_max_results,
        );
        let context = Arc::new(StormContext {
            long_context_model: self
                .long_context_model
                .unwrap_or_else(|| Arc::clone(&self.fast_model)),
            fast_model: self.fast_model,
            interviews: build_interview_graph(Arc::new(interviewer))?,
            embeddings: self.embeddings,
            search: self.search,
            config: self.config,
        });

        let mut builder = StateGraph::<ResearchState>::new("storm");
        builder.add_sequence(vec![
            (INIT_RESEARCH, stage_node(&context, |c, s| async move { c.init_research(s).await })),
            (
                CONDUCT_INTERVIEWS,
                stage_node(&context, |c, s| async move { c.conduct_interviews(s).await }),
            ),
            (REFINE_OUTLINE, stage_node(&context, |c, s| async move { c.refine_outline(s).await })),
            (
                INDEX_REFERENCES,
                stage_node(&context, |c, s| async move { c.index_references(s).await }),
            ),
            (WRITE_SECTIONS, stage_node(&context, |c, s| async move { c.write_sections(s).await })),
            (WRITE_ARTICLE, stage_node(&context, |c, s| async move { c.write_article(s).await })),
        ]);
        let checkpointer = self.checkpointer.or_else(default_checkpointer);
        let graph = builder.compile(checkpointer)?;
        Ok(Storm { graph, context })
    }
}

#[cfg(feature = "memory-store")]
fn default_checkpointer() -> Option<DynCheckpointer> {
    Some(Arc::new(crate::graph::MemorySaver::new()))
}

#[cfg(not(feature = "memory-store"))]
fn default_checkpointer() -> Option<DynCheckpointer> {
    None
}

impl Storm {
    pub fn builder(model: DynChatModel) -> StormBuilder {
        StormBuilder {
            fast_model: model,
            long_context_model: None,
            search: Arc::new(NoSearch),
            embeddings: Arc::new(HashingEmbeddings::default()),
            checkpointer: None,
            config: StormConfig::default(),
        }
    }

    pub fn graph(&self) -> &CompiledGraph<ResearchState> {
        &self.graph
    }

    pub fn config(&self) -> &StormConfig {
        &self.context.config
    }

    /// 逐阶段产出事件
    pub fn stream(
        &self,
        topic: &str,
        config: &RunnableConfig,
    ) -> futures::stream::BoxStream<'static, Result<GraphEvent<ResearchState>>> {
        self.graph.stream(ResearchState::new(topic), config)
    }

    /// 在默认线程 "my-thread" 上生成文章
    pub async fn generate_article(&self, topic: &str) -> Result<String> {
        self.generate_article_with(topic, &RunnableConfig::new(DEFAULT_THREAD_ID))
            .await
    }

    /// 跑完整个流水线后从检查点读取 `article`
    #[instrument(skip(self, config), fields(thread_id = %config.thread_id))]
    pub async fn generate_article_with(&self, topic: &str, config: &RunnableConfig) -> Result<String> {
        let mut events = self.stream(topic, config);
        let mut last = None;
        while let Some(event) = events.next().await {
            let event = event?;
            info!(step = event.step, node = %event.node, "stage finished");
            last = Some(event.state);
        }

        let state = match self.graph.get_state(config).await {
            Ok(Some(snapshot)) => snapshot.values,
            Ok(None) => last.ok_or_else(|| missing(WRITE_ARTICLE, "a finished run"))?,
            // 未配置检查点时使用流中的最终状态
            Err(StormFlowError::Checkpoint(_)) if last.is_some() => {
                last.ok_or_else(|| missing(WRITE_ARTICLE, "a finished run"))?
            }
            Err(e) => return Err(e),
        };
        state.article.ok_or_else(|| missing(WRITE_ARTICLE, "article"))
    }
}
