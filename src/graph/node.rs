use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// 图中的处理节点：读入完整状态，返回更新后的状态
#[async_trait]
pub trait GraphNode<S>: Send + Sync {
    async fn run(&self, state: S) -> Result<S>;
}

pub type DynGraphNode<S> = Arc<dyn GraphNode<S>>;

/// 条件边的路由函数，返回下一个节点名（或 `END`）
pub type Router<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

struct FnNode<F>(F);

#[async_trait]
impl<S, F, Fut> GraphNode<S> for FnNode<F>
where
    S: Send + 'static,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S>> + Send,
{
    async fn run(&self, state: S) -> Result<S> {
        (self.0)(state).await
    }
}

/// 从异步函数创建节点
pub fn node_fn<S, F, Fut>(func: F) -> DynGraphNode<S>
where
    S: Send + 'static,
    F: Fn(S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S>> + Send + 'static,
{
    Arc::new(FnNode(func))
}

/// 从普通函数创建路由
pub fn router_from_fn<S, F>(func: F) -> Router<S>
where
    F: Fn(&S) -> String + Send + Sync + 'static,
{
    Arc::new(func)
}
