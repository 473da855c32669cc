use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 共享听歌会话（本服务只读取参与者集合）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ListeningSessionEntity {
    pub session_id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

/// 会话成员
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionMemberEntity {
    pub session_id: String,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
}
