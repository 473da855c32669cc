use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::database::models::user::UserEntity;

const USER_COLUMNS: &str = "user_id, display_name, spotify_id, visibility, \
     access_token, refresh_token, token_expires_at, last_active_at";

/// 用户查询操作
pub struct UserOperation;

impl UserOperation {
    /// 根据ID查找用户
    pub async fn find_by_id(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Option<UserEntity>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);

        let user = sqlx::query_as::<_, UserEntity>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// 批量查找用户（发现阶段补全候选人档案时使用）
    pub async fn find_by_ids(
        pool: &PgPool,
        user_ids: &[String],
    ) -> Result<Vec<UserEntity>, sqlx::Error> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {} FROM users WHERE user_id = ANY($1)",
            USER_COLUMNS
        );

        let users = sqlx::query_as::<_, UserEntity>(&query)
            .bind(user_ids)
            .fetch_all(pool)
            .await
            .map_err(|e| {
                tracing::error!("Batch user lookup failed: {}", e);
                e
            })?;

        Ok(users)
    }

    /// 按可见性查询近期活跃的用户，按活跃时间倒序
    ///
    /// 对应 (visibility, last_active_at) 索引查询，是发现策略的可替换入口。
    pub async fn find_recent_by_visibility(
        pool: &PgPool,
        visibility: &str,
        active_since: DateTime<Utc>,
    ) -> Result<Vec<UserEntity>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM users \
             WHERE visibility = $1 AND last_active_at > $2 \
             ORDER BY last_active_at DESC",
            USER_COLUMNS
        );

        let users = sqlx::query_as::<_, UserEntity>(&query)
            .bind(visibility)
            .bind(active_since)
            .fetch_all(pool)
            .await
            .map_err(|e| {
                tracing::error!("Recent user index query failed: {}", e);
                e
            })?;

        tracing::debug!("Found {} recent users with visibility {}", users.len(), visibility);
        Ok(users)
    }

    /// 刷新成功后回写访问令牌与过期时间
    pub async fn save_access_token(
        pool: &PgPool,
        user_id: &str,
        access_token: &str,
        token_expires_at: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET access_token = $2, token_expires_at = $3 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(access_token)
        .bind(token_expires_at)
        .execute(pool)
        .await?;

        tracing::info!("Token refreshed for user {}", user_id);
        Ok(())
    }
}
