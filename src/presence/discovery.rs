use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::database::models::user::UserEntity;
use crate::presence::directory::SocialDirectory;
use crate::queue::{WorkItem, WorkQueue};

/// 活跃窗口：最近7天有活动的用户才进入候选集
const ACTIVITY_WINDOW_DAYS: i64 = 7;

/// 补全候选人档案时的批量查询大小
const HYDRATION_BATCH_SIZE: usize = 100;

/// 单次发现运行的统计结果
#[derive(Debug, Default)]
pub struct DiscoverySummary {
    pub recent_shareable: usize,
    pub candidates: usize,
    pub queued: u32,
    pub failed: u32,
}

/// 发现服务：周期性计算值得轮询的用户集合并逐个入队
///
/// 候选集 = 近期活跃的可分享用户 ∪ 会话参与者 ∪ 与二者相邻的好友，
/// 最终过滤掉 private 与档案缺失的候选人。
pub struct DiscoveryService {
    directory: Arc<dyn SocialDirectory>,
    queue: Arc<dyn WorkQueue>,
}

impl DiscoveryService {
    pub fn new(directory: Arc<dyn SocialDirectory>, queue: Arc<dyn WorkQueue>) -> Self {
        Self { directory, queue }
    }

    /// 执行一次发现运行
    ///
    /// 候选索引读取失败对本次运行是致命的，向调度器传播；
    /// 单个候选人的补全或入队失败只记录并跳过。
    pub async fn run(&self) -> Result<DiscoverySummary, sqlx::Error> {
        let cutoff = Utc::now() - Duration::days(ACTIVITY_WINDOW_DAYS);

        let recent = self.directory.recent_shareable(cutoff).await?;
        let recent_shareable = recent.len();

        let mut user_map: HashMap<String, UserEntity> = recent
            .into_iter()
            .map(|user| (user.user_id.clone(), user))
            .collect();

        let mut candidates: HashSet<String> = user_map.keys().cloned().collect();

        // 共享会话的拥有者与成员也需要轮询
        for user_id in self.directory.session_participants().await? {
            candidates.insert(user_id);
        }

        // 扩展到与基础集合相邻的好友（任一方向）
        let base: HashSet<String> = candidates.clone();
        for edge in self.directory.friend_edges().await? {
            if base.contains(&edge.user_id) || base.contains(&edge.friend_id) {
                candidates.insert(edge.user_id);
                candidates.insert(edge.friend_id);
            }
        }

        let mut summary = DiscoverySummary {
            recent_shareable,
            ..Default::default()
        };

        // 批量补全仅通过会话/好友进入候选集的用户档案
        let missing: Vec<String> = candidates
            .iter()
            .filter(|user_id| !user_map.contains_key(*user_id))
            .cloned()
            .collect();
        for chunk in missing.chunks(HYDRATION_BATCH_SIZE) {
            match self.directory.find_users(chunk).await {
                Ok(users) => {
                    for user in users {
                        user_map.insert(user.user_id.clone(), user);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to hydrate {} candidates: {}", chunk.len(), e);
                    summary.failed += chunk.len() as u32;
                }
            }
        }

        for user_id in &candidates {
            // 档案缺失或 private 的候选人不轮询
            let user = match user_map.get(user_id) {
                Some(user) if user.is_shareable() => user,
                _ => continue,
            };

            let spotify_id = match &user.spotify_id {
                Some(spotify_id) => spotify_id,
                None => {
                    tracing::debug!("User {} has no provider identity, skipping", user_id);
                    continue;
                }
            };

            summary.candidates += 1;

            // 队列载荷只带标识，绝不携带凭据
            let item = WorkItem {
                user_id: user.user_id.clone(),
                spotify_id: spotify_id.clone(),
            };
            match self.queue.enqueue(&item).await {
                Ok(()) => summary.queued += 1,
                Err(e) => {
                    tracing::error!("Failed to queue user {}: {}", user_id, e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            "Discovery run completed: {} recent shareable, {} candidates, {} queued, {} failed",
            summary.recent_shareable,
            summary.candidates,
            summary.queued,
            summary.failed
        );

        Ok(summary)
    }
}
