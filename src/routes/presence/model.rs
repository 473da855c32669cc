use serde::Serialize;

use crate::cache::models::presence::PresenceRecord;
use crate::database::models::user::UserEntity;

/// 在线状态网络中的一个节点（自己或好友）
#[derive(Debug, Serialize)]
pub struct NetworkNode {
    pub user_id: String,
    pub display_name: String,
    pub spotify_id: Option<String>,
    pub visibility: String,
    pub presence: Option<PresenceRecord>,
}

impl NetworkNode {
    pub fn build(user: &UserEntity, presence: Option<PresenceRecord>) -> Self {
        NetworkNode {
            user_id: user.user_id.clone(),
            display_name: user
                .display_name
                .clone()
                .or_else(|| user.spotify_id.clone())
                .unwrap_or_else(|| "Friend".to_string()),
            spotify_id: user.spotify_id.clone(),
            visibility: user.visibility.clone(),
            presence,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NetworkResponse {
    pub nodes: Vec<NetworkNode>,
}
