use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};

use crate::cache::keys::connection_keys;
use crate::cache::models::connection::{CONNECTION_TTL_SECS, ConnectionEntry};

/// 连接注册表契约
///
/// 连接建立时写入，显式断开或投递发现对端离线时删除。
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn register(&self, entry: &ConnectionEntry) -> Result<(), redis::RedisError>;
    async fn remove(&self, connection_id: &str) -> Result<(), redis::RedisError>;
    async fn connections_for(&self, user_id: &str) -> Result<Vec<String>, redis::RedisError>;
}

/// 基于 Redis 的连接注册表
///
/// conn:info:{id} 保存连接详情，conn:user:{userId} 维护用户的连接集合。
pub struct RedisConnectionRegistry {
    redis: Arc<RedisClient>,
}

impl RedisConnectionRegistry {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl ConnectionRegistry for RedisConnectionRegistry {
    async fn register(&self, entry: &ConnectionEntry) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let info_key = connection_keys::connection_info_key(&entry.connection_id);
        let set_key = connection_keys::user_connections_key(&entry.user_id);

        let json = serde_json::to_string(entry).map_err(|e| {
            redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Serialization error",
                e.to_string(),
            ))
        })?;

        let _: () = conn.set_ex(&info_key, json, CONNECTION_TTL_SECS).await?;
        let _: () = conn.sadd(&set_key, &entry.connection_id).await?;
        let _: () = conn.expire(&set_key, CONNECTION_TTL_SECS as i64).await?;

        Ok(())
    }

    async fn remove(&self, connection_id: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let info_key = connection_keys::connection_info_key(connection_id);
        let info: Option<String> = conn.get(&info_key).await?;

        // 信息已过期时仍要清理用户集合里的残留成员
        if let Some(json) = info {
            if let Ok(entry) = serde_json::from_str::<ConnectionEntry>(&json) {
                let set_key = connection_keys::user_connections_key(&entry.user_id);
                let _: () = conn.srem(&set_key, connection_id).await?;
            }
        }

        let _: () = conn.del(&info_key).await?;

        Ok(())
    }

    async fn connections_for(&self, user_id: &str) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let set_key = connection_keys::user_connections_key(user_id);
        let members: Vec<String> = conn.smembers(&set_key).await?;

        // 惰性清理：info 键已过期的连接从集合中剔除
        let mut live = Vec::with_capacity(members.len());
        for connection_id in members {
            let info_key = connection_keys::connection_info_key(&connection_id);
            let exists: bool = conn.exists(&info_key).await?;
            if exists {
                live.push(connection_id);
            } else {
                let _: () = conn.srem(&set_key, &connection_id).await?;
            }
        }

        Ok(live)
    }
}
