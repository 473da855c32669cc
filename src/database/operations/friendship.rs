use sqlx::PgPool;

use crate::database::models::friendship::FriendEdge;

/// 好友关系查询操作
pub struct FriendshipOperation;

impl FriendshipOperation {
    /// 查询某用户的出边好友（受众计算以当前用户为键）
    pub async fn friends_of(pool: &PgPool, user_id: &str) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT friend_id FROM friendships WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(friend_id,)| friend_id).collect())
    }

    /// 全量读取好友边，供发现阶段扩展候选集
    pub async fn all_edges(pool: &PgPool) -> Result<Vec<FriendEdge>, sqlx::Error> {
        let edges = sqlx::query_as::<_, FriendEdge>(
            "SELECT user_id, friend_id FROM friendships",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| {
            tracing::error!("Friend edge scan failed: {}", e);
            e
        })?;

        Ok(edges)
    }
}
