use sqlx::PgPool;

/// 共享会话查询操作
pub struct SessionOperation;

impl SessionOperation {
    /// 读取所有活跃会话的拥有者与成员（去重后的用户ID集合）
    pub async fn participant_ids(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT owner_id AS user_id FROM listening_sessions \
             UNION \
             SELECT user_id FROM session_members",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| {
            tracing::error!("Session participant scan failed: {}", e);
            e
        })?;

        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }
}
