use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::models::presence::PresenceRecord;
use crate::database::models::user::{UserEntity, Visibility};
use crate::presence::broadcaster::Broadcaster;
use crate::presence::directory::SocialDirectory;
use crate::ws::{GraphNode, ServerMessage};

/// 变更通知器：消费在线状态变更流，计算受众并交给广播器
pub struct ChangeNotifier {
    directory: Arc<dyn SocialDirectory>,
    broadcaster: Arc<Broadcaster>,
}

impl ChangeNotifier {
    pub fn new(directory: Arc<dyn SocialDirectory>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            directory,
            broadcaster,
        }
    }

    /// 处理一条变更事件，返回成功投递的连接数
    pub async fn handle_change(&self, record: &PresenceRecord) -> usize {
        let user = match self.directory.find_user(&record.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!("User {} not found during broadcast", record.user_id);
                return 0;
            }
            Err(e) => {
                tracing::error!("Failed to load user {} for broadcast: {}", record.user_id, e);
                return 0;
            }
        };

        // private 用户的变更不广播
        if user.visibility() == Visibility::Private {
            tracing::debug!("User {} is private, skipping broadcast", record.user_id);
            return 0;
        }

        let audience = match self.resolve_audience(&user).await {
            Ok(audience) => audience,
            Err(e) => {
                tracing::error!(
                    "Failed to resolve audience for user {}: {}",
                    record.user_id,
                    e
                );
                return 0;
            }
        };

        let message = ServerMessage::PresenceUpdate {
            user_id: record.user_id.clone(),
            display_name: user.display_name.clone(),
            spotify_id: user.spotify_id.clone(),
            data: record.clone(),
            graph_node: GraphNode::build(&user, record),
        };
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to serialize presence update: {}", e);
                return 0;
            }
        };

        tracing::info!(
            "Broadcasting presence update for user {} ({} recipients)",
            record.user_id,
            audience.len()
        );

        self.broadcaster.broadcast(&audience, &payload).await
    }

    /// 受众 = 出边好友 ∪ 用户自身（多设备同步）
    ///
    /// public 目前与 friends 一样只向好友广播，不存在独立的公共频道。
    async fn resolve_audience(&self, user: &UserEntity) -> Result<HashSet<String>, sqlx::Error> {
        let mut audience: HashSet<String> =
            self.directory.friends_of(&user.user_id).await?.into_iter().collect();
        audience.insert(user.user_id.clone());
        Ok(audience)
    }
}
