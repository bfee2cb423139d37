// Graph 模块：带检查点的状态图工作流引擎

pub mod builder;
pub mod checkpoint;
pub mod executor;
pub mod node;

pub use builder::{StateGraph, END, START};
#[cfg(feature = "redis-store")]
pub use checkpoint::redis_store::RedisSaver;
#[cfg(feature = "memory-store")]
pub use checkpoint::MemorySaver;
pub use checkpoint::{Checkpoint, Checkpointer, DynCheckpointer};
pub use executor::{CompiledGraph, GraphEvent, RunnableConfig, StateSnapshot, DEFAULT_THREAD_ID};
pub use node::{node_fn, router_from_fn, DynGraphNode, GraphNode, Router};
