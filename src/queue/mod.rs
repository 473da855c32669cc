// 轮询工作队列
// 至少一次投递：消息被取出后进入处理中列表，可见性窗口内未确认则重新投递。
// 没有最大投递次数限制，死信控制留给部署层面处理。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient, Script};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::keys::queue_keys;
use crate::utils::now_ts;

/// 轮询工作项：只携带标识，凭据绝不进入队列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub user_id: String,
    pub spotify_id: String,
}

/// 队列消息封装
///
/// message_id 保证同一用户的重复入队消息可以各自独立确认。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub item: WorkItem,
}

/// 一次投递：raw 保留原始载荷用于确认时精确移除
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: QueueMessage,
    raw: String,
}

impl Delivery {
    #[cfg(test)]
    pub(crate) fn new(message: QueueMessage, raw: String) -> Self {
        Self { message, raw }
    }

    pub fn item(&self) -> &WorkItem {
        &self.message.item
    }
}

/// 工作队列契约
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, item: &WorkItem) -> Result<(), redis::RedisError>;
    async fn receive(&self) -> Result<Option<Delivery>, redis::RedisError>;
    /// 确认消息：仅在不需要重试的结果上调用
    async fn ack(&self, delivery: &Delivery) -> Result<(), redis::RedisError>;
    /// 把超过可见性窗口仍未确认的消息移回就绪列表，返回移回数量
    async fn reclaim_expired(&self) -> Result<u32, redis::RedisError>;
}

/// 原子取件：移动到处理中列表和登记可见性截止时间必须一步完成，
/// 中间崩溃会留下处理中列表里永远不被回收的消息
const RECEIVE_SCRIPT: &str = r"
local raw = redis.call('LMOVE', KEYS[1], KEYS[2], 'LEFT', 'RIGHT')
if not raw then
    return false
end
redis.call('ZADD', KEYS[3], ARGV[1], raw)
return raw
";

/// 基于 Redis 列表的工作队列实现
pub struct RedisWorkQueue {
    redis: Arc<RedisClient>,
    visibility: Duration,
    receive_script: Script,
}

impl RedisWorkQueue {
    pub fn new(redis: Arc<RedisClient>, visibility: Duration) -> Self {
        Self {
            redis,
            visibility,
            receive_script: Script::new(RECEIVE_SCRIPT),
        }
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn enqueue(&self, item: &WorkItem) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let message = QueueMessage {
            message_id: Uuid::new_v4().to_string(),
            item: item.clone(),
        };
        let raw = serde_json::to_string(&message).map_err(|e| {
            redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Serialization error",
                e.to_string(),
            ))
        })?;

        let _: () = conn.rpush(queue_keys::POLL_QUEUE_READY, raw).await?;

        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let deadline = now_ts() + self.visibility.as_secs() as i64;
        let raw: Option<String> = self
            .receive_script
            .key(queue_keys::POLL_QUEUE_READY)
            .key(queue_keys::POLL_QUEUE_PROCESSING)
            .key(queue_keys::POLL_QUEUE_DEADLINES)
            .arg(deadline)
            .invoke_async(&mut conn)
            .await?;

        let raw = match raw {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let message: QueueMessage = serde_json::from_str(&raw).map_err(|e| {
            redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Deserialization error",
                e.to_string(),
            ))
        })?;

        Ok(Some(Delivery { message, raw }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let _: () = conn
            .lrem(queue_keys::POLL_QUEUE_PROCESSING, 1, &delivery.raw)
            .await?;
        let _: () = conn
            .zrem(queue_keys::POLL_QUEUE_DEADLINES, &delivery.raw)
            .await?;

        Ok(())
    }

    async fn reclaim_expired(&self) -> Result<u32, redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let expired: Vec<String> = conn
            .zrangebyscore(queue_keys::POLL_QUEUE_DEADLINES, "-inf", now_ts())
            .await?;

        let mut reclaimed = 0u32;
        for raw in expired {
            let removed: i64 = conn
                .lrem(queue_keys::POLL_QUEUE_PROCESSING, 1, &raw)
                .await?;
            let _: () = conn.zrem(queue_keys::POLL_QUEUE_DEADLINES, &raw).await?;

            // 刚好在确认边界上被移除的消息不再重新入队
            if removed > 0 {
                let _: () = conn.rpush(queue_keys::POLL_QUEUE_READY, &raw).await?;
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            tracing::info!("Reclaimed {} expired queue deliveries", reclaimed);
        }

        Ok(reclaimed)
    }
}
