// WebSocket 传输层
// 连接时校验令牌并登记注册表，断开或投递失败时清理。

pub mod transport;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    AppState,
    cache::models::connection::ConnectionEntry,
    cache::models::presence::PresenceRecord,
    database::models::user::UserEntity,
    utils::{now_ts, verify_token},
    ws::transport::OUTBOX_CAPACITY,
};

/// 客户端动作：封闭的标签变体，未知动作在解析阶段就被拒绝
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    Ping,
    Subscribe,
    Unsubscribe,
}

/// 推送给客户端的图节点投影
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub user_id: String,
    pub display_name: String,
    pub spotify_id: Option<String>,
    pub visibility: String,
    pub last_active_at: i64,
    pub presence: PresenceRecord,
}

impl GraphNode {
    pub fn build(user: &UserEntity, record: &PresenceRecord) -> Self {
        GraphNode {
            user_id: user.user_id.clone(),
            display_name: user
                .display_name
                .clone()
                .or_else(|| user.spotify_id.clone())
                .unwrap_or_else(|| "Friend".to_string()),
            spotify_id: user.spotify_id.clone(),
            visibility: user.visibility.clone(),
            last_active_at: user.last_active_at.timestamp(),
            presence: record.clone(),
        }
    }
}

/// 服务端下行消息
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    PresenceUpdate {
        user_id: String,
        display_name: Option<String>,
        spotify_id: Option<String>,
        data: PresenceRecord,
        graph_node: GraphNode,
    },
    Pong {
        timestamp: i64,
    },
    Subscribed {
        message: String,
    },
    Unsubscribed {
        message: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: String,
}

/// WebSocket 升级入口，令牌放在查询参数里
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match verify_token(&params.token, &state.config) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("WebSocket connect rejected, invalid token: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, socket, claims.sub))
}

async fn handle_socket(state: AppState, socket: WebSocket, user_id: String) {
    let connection_id = Uuid::new_v4().to_string();

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
    state.transport.attach(&connection_id, outbox_tx).await;

    let entry = ConnectionEntry {
        connection_id: connection_id.clone(),
        user_id: user_id.clone(),
        connected_at: now_ts(),
    };
    if let Err(e) = state.registry.register(&entry).await {
        tracing::error!("Failed to register connection {}: {}", connection_id, e);
        state.transport.detach(&connection_id).await;
        return;
    }

    tracing::info!(
        "WebSocket connection established: {} (user {})",
        connection_id,
        user_id
    );

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outgoing = outbox_rx.recv() => {
                match outgoing {
                    Some(payload) => {
                        if sink.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientAction>(&text) {
                            Ok(action) => handle_action(action, &connection_id, &user_id),
                            Err(_) => {
                                tracing::warn!(
                                    "Unknown action on connection {}: {}",
                                    connection_id,
                                    text
                                );
                                ServerMessage::Error {
                                    message: "unknown action".to_string(),
                                }
                            }
                        };
                        match serde_json::to_string(&reply) {
                            Ok(json) => {
                                if sink.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to serialize reply: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error on {}: {}", connection_id, e);
                        break;
                    }
                }
            }
        }
    }

    // 清理：卸载信箱并删除注册表记录
    state.transport.detach(&connection_id).await;
    if let Err(e) = state.registry.remove(&connection_id).await {
        tracing::warn!("Failed to remove connection {}: {}", connection_id, e);
    }
    tracing::info!("WebSocket connection removed: {}", connection_id);
}

fn handle_action(action: ClientAction, connection_id: &str, user_id: &str) -> ServerMessage {
    match action {
        ClientAction::Ping => {
            tracing::debug!("Ping from {} (user {})", connection_id, user_id);
            ServerMessage::Pong {
                timestamp: now_ts(),
            }
        }
        // 订阅在连接时基于好友关系自动生效，这里只做显式确认
        ClientAction::Subscribe => ServerMessage::Subscribed {
            message: "You are now subscribed to presence updates".to_string(),
        },
        ClientAction::Unsubscribe => ServerMessage::Unsubscribed {
            message: "You are now unsubscribed from presence updates".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_actions_parse_from_tagged_json() {
        let action: ClientAction = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert_eq!(action, ClientAction::Ping);

        let action: ClientAction = serde_json::from_str(r#"{"action":"subscribe"}"#).unwrap();
        assert_eq!(action, ClientAction::Subscribe);

        let action: ClientAction = serde_json::from_str(r#"{"action":"unsubscribe"}"#).unwrap();
        assert_eq!(action, ClientAction::Unsubscribe);
    }

    #[test]
    fn unknown_action_is_a_parse_error() {
        let result = serde_json::from_str::<ClientAction>(r#"{"action":"shout"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn ping_yields_pong_with_timestamp() {
        let reply = handle_action(ClientAction::Ping, "c1", "u1");
        match reply {
            ServerMessage::Pong { timestamp } => assert!(timestamp > 0),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn presence_update_serializes_with_type_tag() {
        let record = PresenceRecord::not_playing("u1", "s1", 1);
        let user = UserEntity {
            user_id: "u1".to_string(),
            display_name: None,
            spotify_id: Some("s1".to_string()),
            visibility: "friends".to_string(),
            access_token: None,
            refresh_token: None,
            token_expires_at: 0,
            last_active_at: chrono::Utc::now(),
        };
        let message = ServerMessage::PresenceUpdate {
            user_id: "u1".to_string(),
            display_name: None,
            spotify_id: Some("s1".to_string()),
            data: record.clone(),
            graph_node: GraphNode::build(&user, &record),
        };

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""type":"presence_update""#));
        // 显示名缺失时退回 spotify_id
        assert!(json.contains(r#""display_name":"s1""#));
    }
}
