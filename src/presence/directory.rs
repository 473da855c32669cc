use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::database::models::friendship::FriendEdge;
use crate::database::models::user::{UserEntity, Visibility};
use crate::database::operations::{FriendshipOperation, SessionOperation, UserOperation};

/// 社交图与用户档案的读取入口
///
/// recent_shareable 是显式的「按活跃时间排序的索引查询」，
/// 后续若改为增量活跃集策略，替换实现即可，发现服务的契约不变。
#[async_trait]
pub trait SocialDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserEntity>, sqlx::Error>;
    async fn find_users(&self, user_ids: &[String]) -> Result<Vec<UserEntity>, sqlx::Error>;
    async fn recent_shareable(
        &self,
        active_since: DateTime<Utc>,
    ) -> Result<Vec<UserEntity>, sqlx::Error>;
    async fn session_participants(&self) -> Result<Vec<String>, sqlx::Error>;
    async fn friend_edges(&self) -> Result<Vec<FriendEdge>, sqlx::Error>;
    async fn friends_of(&self, user_id: &str) -> Result<Vec<String>, sqlx::Error>;
    async fn save_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        token_expires_at: i64,
    ) -> Result<(), sqlx::Error>;
}

/// 基于 Postgres 的目录实现
pub struct PgSocialDirectory {
    pool: PgPool,
}

impl PgSocialDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SocialDirectory for PgSocialDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserEntity>, sqlx::Error> {
        UserOperation::find_by_id(&self.pool, user_id).await
    }

    async fn find_users(&self, user_ids: &[String]) -> Result<Vec<UserEntity>, sqlx::Error> {
        UserOperation::find_by_ids(&self.pool, user_ids).await
    }

    async fn recent_shareable(
        &self,
        active_since: DateTime<Utc>,
    ) -> Result<Vec<UserEntity>, sqlx::Error> {
        let mut users = Vec::new();
        for visibility in Visibility::SHAREABLE {
            users.extend(
                UserOperation::find_recent_by_visibility(
                    &self.pool,
                    visibility.as_str(),
                    active_since,
                )
                .await?,
            );
        }
        Ok(users)
    }

    async fn session_participants(&self) -> Result<Vec<String>, sqlx::Error> {
        SessionOperation::participant_ids(&self.pool).await
    }

    async fn friend_edges(&self) -> Result<Vec<FriendEdge>, sqlx::Error> {
        FriendshipOperation::all_edges(&self.pool).await
    }

    async fn friends_of(&self, user_id: &str) -> Result<Vec<String>, sqlx::Error> {
        FriendshipOperation::friends_of(&self.pool, user_id).await
    }

    async fn save_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        token_expires_at: i64,
    ) -> Result<(), sqlx::Error> {
        UserOperation::save_access_token(&self.pool, user_id, access_token, token_expires_at).await
    }
}
