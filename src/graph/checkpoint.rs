use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

const CHECKPOINT_PREFIX: &str = "checkpoint";

/// 某个线程在一次节点执行之后的状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub step: u32,
    /// 刚执行完的节点（初始快照为 `__start__`）
    pub node: String,
    /// 下一个要执行的节点（结束时为 `__end__`）
    pub next: String,
    pub state: Value,
    pub created_at_ms: u64,
}

impl Checkpoint {
    pub fn new(
        thread_id: impl Into<String>,
        step: u32,
        node: impl Into<String>,
        next: impl Into<String>,
        state: Value,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            step,
            node: node.into(),
            next: next.into(),
            state,
            created_at_ms: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// 检查点存储
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()>;
    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;
    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>>;
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}

pub type DynCheckpointer = Arc<dyn Checkpointer>;

/// 进程内检查点存储
#[cfg(feature = "memory-store")]
#[derive(Default)]
pub struct MemorySaver {
    threads: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

#[cfg(feature = "memory-store")]
impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "memory-store")]
#[async_trait]
impl Checkpointer for MemorySaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        self.threads
            .write()
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .threads
            .read()
            .get(thread_id)
            .and_then(|items| items.last().cloned()))
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        Ok(self
            .threads
            .read()
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.threads.write().remove(thread_id);
        Ok(())
    }
}

#[cfg_attr(not(feature = "redis-store"), allow(dead_code))]
fn thread_key(thread_id: &str) -> String {
    format!("{CHECKPOINT_PREFIX}:{thread_id}")
}

#[cfg(feature = "redis-store")]
pub mod redis_store {
    use super::*;
    use crate::error::StormFlowError;
    use ::redis::AsyncCommands;

    /// 每个线程一个 Redis list，元素为 JSON 序列化的检查点
    pub struct RedisSaver {
        client: ::redis::Client,
    }

    impl RedisSaver {
        pub fn new(client: ::redis::Client) -> Self {
            Self { client }
        }

        pub fn open(url: &str) -> Result<Self> {
            let client = ::redis::Client::open(url)
                .map_err(|e| StormFlowError::Checkpoint(e.to_string()))?;
            Ok(Self::new(client))
        }

        async fn connection(&self) -> Result<::redis::aio::MultiplexedConnection> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| StormFlowError::Checkpoint(e.to_string()))
        }
    }

    fn decode(raw: &str) -> Result<Checkpoint> {
        serde_json::from_str(raw).map_err(|e| StormFlowError::Checkpoint(e.to_string()))
    }

    #[async_trait]
    impl Checkpointer for RedisSaver {
        async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
            let payload = serde_json::to_string(&checkpoint)?;
            let mut conn = self.connection().await?;
            let _: i64 = conn
                .rpush(thread_key(&checkpoint.thread_id), payload)
                .await
                .map_err(|e| StormFlowError::Checkpoint(e.to_string()))?;
            Ok(())
        }

        async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
            let mut conn = self.connection().await?;
            let raw: Option<String> = conn
                .lindex(thread_key(thread_id), -1)
                .await
                .map_err(|e| StormFlowError::Checkpoint(e.to_string()))?;
            raw.as_deref().map(decode).transpose()
        }

        async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
            let mut conn = self.connection().await?;
            let raw: Vec<String> = conn
                .lrange(thread_key(thread_id), 0, -1)
                .await
                .map_err(|e| StormFlowError::Checkpoint(e.to_string()))?;
            raw.iter().map(|item| decode(item)).collect()
        }

        async fn delete_thread(&self, thread_id: &str) -> Result<()> {
            let mut conn = self.connection().await?;
            let _: i64 = conn
                .del(thread_key(thread_id))
                .await
                .map_err(|e| StormFlowError::Checkpoint(e.to_string()))?;
            Ok(())
        }
    }

}
