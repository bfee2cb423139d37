use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, info_span, Instrument};

use super::builder::{Edge, END, START};
use super::checkpoint::{Checkpoint, DynCheckpointer};
use super::node::DynGraphNode;
use crate::error::{Result, StormFlowError};

const DEFAULT_MAX_STEPS: u32 = 64;
pub const DEFAULT_THREAD_ID: &str = "default";

/// 单次运行的配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnableConfig {
    pub thread_id: String,
    pub max_steps: Option<u32>,
}

impl RunnableConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            max_steps: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    fn max_steps(&self) -> u32 {
        self.max_steps.unwrap_or(DEFAULT_MAX_STEPS)
    }
}

impl Default for RunnableConfig {
    fn default() -> Self {
        Self::new(DEFAULT_THREAD_ID)
    }
}

/// 每个节点执行完毕后产生的事件
#[derive(Debug, Clone)]
pub struct GraphEvent<S> {
    pub step: u32,
    pub node: String,
    pub next: String,
    pub state: S,
}

/// 从检查点读取的线程状态
#[derive(Debug, Clone)]
pub struct StateSnapshot<S> {
    pub values: S,
    /// 下一个待执行节点；已结束为 `None`
    pub next: Option<String>,
    pub step: u32,
    pub created_at_ms: u64,
}

pub(crate) struct GraphInner<S> {
    pub name: String,
    pub entry: String,
    pub nodes: HashMap<String, DynGraphNode<S>>,
    pub edges: HashMap<String, Edge<S>>,
    pub checkpointer: Option<DynCheckpointer>,
}

/// 编译后的状态图，可廉价克隆并在多个任务间共享
pub struct CompiledGraph<S> {
    inner: Arc<GraphInner<S>>,
}

impl<S> Clone for CompiledGraph<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// 运行游标：当前状态、下一个节点、已执行步数
struct Cursor<S> {
    state: S,
    next: String,
    step: u32,
}

impl<S> CompiledGraph<S>
where
    S: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(inner: GraphInner<S>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn entry(&self) -> &str {
        &self.inner.entry
    }

    fn route(&self, from: &str, state: &S) -> Result<String> {
        match self.inner.edges.get(from) {
            Some(Edge::Static(to)) => Ok(to.clone()),
            Some(Edge::Conditional { router, targets }) => {
                let to = router(state);
                if targets.iter().any(|t| *t == to) {
                    Ok(to)
                } else {
                    Err(StormFlowError::InvalidTransition {
                        from: from.to_string(),
                        to,
                    })
                }
            }
            None => Err(StormFlowError::UnknownNode(from.to_string())),
        }
    }

    async fn save(&self, config: &RunnableConfig, checkpoint: impl FnOnce() -> Result<Checkpoint>) -> Result<()> {
        if let Some(checkpointer) = &self.inner.checkpointer {
            let checkpoint = checkpoint()?;
            debug!(
                thread_id = %config.thread_id,
                step = checkpoint.step,
                node = %checkpoint.node,
                "saving checkpoint"
            );
            checkpointer.put(checkpoint).await?;
        }
        Ok(())
    }

    async fn begin(&self, input: S, config: &RunnableConfig) -> Result<Cursor<S>> {
        let entry = self.inner.entry.clone();
        self.save(config, || {
            Ok(Checkpoint::new(
                config.thread_id.clone(),
                0,
                START,
                entry.clone(),
                serde_json::to_value(&input)?,
            ))
        })
        .await?;
        Ok(Cursor {
            state: input,
            next: entry,
            step: 0,
        })
    }

    /// 执行游标指向的节点，路由并写入检查点
    async fn advance(&self, cursor: Cursor<S>, config: &RunnableConfig) -> Result<(Cursor<S>, GraphEvent<S>)> {
        if cursor.step >= config.max_steps() {
            return Err(StormFlowError::MaxStepsExceeded(config.max_steps()));
        }
        let node_name = cursor.next;
        let node = self
            .inner
            .nodes
            .get(&node_name)
            .ok_or_else(|| StormFlowError::UnknownNode(node_name.clone()))?;

        let span = info_span!(
            "graph_node",
            graph = %self.inner.name,
            node = %node_name,
            step = cursor.step + 1
        );
        let state = node.run(cursor.state).instrument(span).await?;
        let next = self.route(&node_name, &state)?;
        let step = cursor.step + 1;

        self.save(config, || {
            Ok(Checkpoint::new(
                config.thread_id.clone(),
                step,
                node_name.clone(),
                next.clone(),
                serde_json::to_value(&state)?,
            ))
        })
        .await?;

        let event = GraphEvent {
            step,
            node: node_name,
            next: next.clone(),
            state: state.clone(),
        };
        Ok((Cursor { state, next, step }, event))
    }

    async fn run_to_end(&self, mut cursor: Cursor<S>, config: &RunnableConfig) -> Result<S> {
        while cursor.next != END {
            let (next, _) = self.advance(cursor, config).await?;
            cursor = next;
        }
        Ok(cursor.state)
    }

    pub async fn invoke(&self, input: S, config: &RunnableConfig) -> Result<S> {
        info!(graph = %self.inner.name, thread_id = %config.thread_id, "graph run started");
        let cursor = self.begin(input, config).await?;
        let state = self.run_to_end(cursor, config).await?;
        info!(graph = %self.inner.name, thread_id = %config.thread_id, "graph run finished");
        Ok(state)
    }

    /// 逐节点产出事件；丢弃流即停止执行
    pub fn stream(&self, input: S, config: &RunnableConfig) -> BoxStream<'static, Result<GraphEvent<S>>> {
        let graph = self.clone();
        let config = config.clone();
        stream::unfold(
            StreamPhase::Start(input),
            move |phase| {
                let graph = graph.clone();
                let config = config.clone();
                async move {
                    let cursor = match phase {
                        StreamPhase::Start(input) => match graph.begin(input, &config).await {
                            Ok(cursor) => cursor,
                            Err(e) => return Some((Err(e), StreamPhase::Done)),
                        },
                        StreamPhase::Running(cursor) => cursor,
                        StreamPhase::Done => return None,
                    };
                    if cursor.next == END {
                        return None;
                    }
                    match graph.advance(cursor, &config).await {
                        Ok((cursor, event)) => Some((Ok(event), StreamPhase::Running(cursor))),
                        Err(e) => Some((Err(e), StreamPhase::Done)),
                    }
                }
            },
        )
        .boxed()
    }

    fn checkpointer(&self) -> Result<&DynCheckpointer> {
        self.inner.checkpointer.as_ref().ok_or_else(|| {
            StormFlowError::Checkpoint(format!(
                "graph `{}` was compiled without a checkpointer",
                self.inner.name
            ))
        })
    }

    pub async fn get_state(&self, config: &RunnableConfig) -> Result<Option<StateSnapshot<S>>> {
        let Some(checkpoint) = self.checkpointer()?.latest(&config.thread_id).await? else {
            return Ok(None);
        };
        let values = serde_json::from_value(checkpoint.state)
            .map_err(|e| StormFlowError::Checkpoint(format!("cannot restore state: {e}")))?;
        Ok(Some(StateSnapshot {
            values,
            next: Some(checkpoint.next).filter(|next| next != END),
            step: checkpoint.step,
            created_at_ms: checkpoint.created_at_ms,
        }))
    }

    /// 从线程最近的检查点继续执行
    pub async fn resume(&self, config: &RunnableConfig) -> Result<S> {
        let snapshot = self.get_state(config).await?.ok_or_else(|| {
            StormFlowError::Checkpoint(format!(
                "no checkpoint for thread `{}`",
                config.thread_id
            ))
        })?;
        let Some(next) = snapshot.next else {
            return Ok(snapshot.values);
        };
        info!(
            graph = %self.inner.name,
            thread_id = %config.thread_id,
            next = %next,
            step = snapshot.step,
            "resuming graph run"
        );
        let cursor = Cursor {
            state: snapshot.values,
            next,
            step: snapshot.step,
        };
        self.run_to_end(cursor, config).await
    }

    /// 并行执行多个输入，结果顺序与输入一致
    ///
    /// 每个输入使用 `{thread_id}:{index}` 作为独立线程。
    pub async fn batch(
        &self,
        inputs: Vec<S>,
        config: &RunnableConfig,
        concurrency: usize,
    ) -> Result<Vec<S>> {
        let configs: Vec<RunnableConfig> = (0..inputs.len())
            .map(|index| RunnableConfig {
                thread_id: format!("{}:{index}", config.thread_id),
                max_steps: config.max_steps,
            })
            .collect();

        stream::iter(inputs.into_iter().zip(configs))
            .map(|(input, config)| {
                let graph = self.clone();
                async move { graph.invoke(input, &config).await }
            })
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }
}

enum StreamPhase<S> {
    Start(S),
    Running(Cursor<S>),
    Done,
}
