use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 好友关系实体（有向边，互为好友时存在两条记录）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FriendshipEntity {
    pub user_id: String,
    pub friend_id: String,
    pub created_at: DateTime<Utc>,
}

/// 好友边的轻量投影，用于发现阶段的批量扫描
#[derive(Debug, Clone, FromRow)]
pub struct FriendEdge {
    pub user_id: String,
    pub friend_id: String,
}
