use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 可见性设置
///
/// `public` 目前与 `friends` 采用相同的好友范围广播，参见 notifier 模块。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Friends,
    Public,
}

impl Visibility {
    /// 解析存储值，未知或缺失时回退为 friends
    pub fn parse(value: &str) -> Self {
        match value {
            "private" => Visibility::Private,
            "public" => Visibility::Public,
            _ => Visibility::Friends,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Friends => "friends",
            Visibility::Public => "public",
        }
    }

    /// 允许被轮询和广播的可见性集合
    pub const SHAREABLE: [Visibility; 2] = [Visibility::Friends, Visibility::Public];
}

/// 用户实体（本服务只读，仅在刷新令牌时回写凭据字段）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserEntity {
    pub user_id: String,
    pub display_name: Option<String>,
    pub spotify_id: Option<String>,
    pub visibility: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: i64, // Unix timestamp
    pub last_active_at: DateTime<Utc>,
}

impl UserEntity {
    pub fn visibility(&self) -> Visibility {
        Visibility::parse(&self.visibility)
    }

    pub fn is_shareable(&self) -> bool {
        self.visibility() != Visibility::Private
    }
}
