use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    cache::operations::presence::PresenceStore,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{NetworkNode, NetworkResponse};

/// 返回当前用户及其好友的在线状态网络
#[axum::debug_handler]
pub async fn network(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let friend_ids = match state.directory.friends_of(&claims.sub).await {
        Ok(friend_ids) => friend_ids,
        Err(e) => {
            tracing::error!("Failed to list friends for {}: {}", claims.sub, e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询好友列表失败".to_string()),
            );
        }
    };

    let mut network_ids = vec![claims.sub.clone()];
    network_ids.extend(friend_ids.into_iter().filter(|id| *id != claims.sub));

    let users = match state.directory.find_users(&network_ids).await {
        Ok(users) => users,
        Err(e) => {
            tracing::error!("Failed to load network profiles for {}: {}", claims.sub, e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询用户档案失败".to_string()),
            );
        }
    };

    let mut nodes = Vec::with_capacity(users.len());
    for user in &users {
        // 单个用户的状态读取失败按无状态处理，不影响其他节点
        let presence = match state.presence_store.read(&user.user_id).await {
            Ok(presence) => presence,
            Err(e) => {
                tracing::warn!("Failed to read presence for {}: {}", user.user_id, e);
                None
            }
        };
        nodes.push(NetworkNode::build(user, presence));
    }

    (
        StatusCode::OK,
        success_to_api_response(NetworkResponse { nodes }),
    )
}
