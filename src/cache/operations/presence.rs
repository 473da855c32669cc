use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient, Script};
use tokio::sync::broadcast;

use crate::cache::keys::presence_keys;
use crate::cache::models::presence::{PRESENCE_TTL_SECS, PresenceRecord};

/// 写入结果：同一用户可能有并发抓取，落后的写入会被拒绝
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored,
    Stale,
}

/// 在线状态存储契约
///
/// 每次成功写入都会在变更流上产生一个事件，供通知器消费。
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn write(&self, record: &PresenceRecord) -> Result<WriteOutcome, redis::RedisError>;
    async fn read(&self, user_id: &str) -> Result<Option<PresenceRecord>, redis::RedisError>;
}

/// 变更流通道容量，落后的订阅者会跳过旧事件
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// 条件写入：仅当 updated_at 严格前进时覆写，防止乱序完成的旧结果覆盖新结果
const CONDITIONAL_WRITE_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if current then
    local decoded = cjson.decode(current)
    if tonumber(decoded['updated_at']) >= tonumber(ARGV[2]) then
        return 0
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', tonumber(ARGV[3]))
return 1
";

/// 基于 Redis 的在线状态存储
pub struct RedisPresenceStore {
    redis: Arc<RedisClient>,
    write_script: Script,
    changes: broadcast::Sender<PresenceRecord>,
}

impl RedisPresenceStore {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            redis,
            write_script: Script::new(CONDITIONAL_WRITE_SCRIPT),
            changes,
        }
    }

    /// 订阅变更流，每个通知器任务调用一次
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceRecord> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn write(&self, record: &PresenceRecord) -> Result<WriteOutcome, redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let key = presence_keys::presence_key(&record.user_id);
        let json = serde_json::to_string(record).map_err(|e| {
            redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Serialization error",
                e.to_string(),
            ))
        })?;

        let stored: i32 = self
            .write_script
            .key(key)
            .arg(json)
            .arg(record.updated_at)
            .arg(PRESENCE_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;

        if stored == 0 {
            tracing::debug!("Rejected stale presence write for user {}", record.user_id);
            return Ok(WriteOutcome::Stale);
        }

        // 变更流：没有订阅者时发送失败是正常情况
        let _ = self.changes.send(record.clone());

        Ok(WriteOutcome::Stored)
    }

    async fn read(&self, user_id: &str) -> Result<Option<PresenceRecord>, redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let key = presence_keys::presence_key(user_id);
        let result: Option<String> = conn.get(key).await?;

        match result {
            Some(json) => {
                let record = serde_json::from_str(&json).map_err(|e| {
                    redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "Deserialization error",
                        e.to_string(),
                    ))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}
