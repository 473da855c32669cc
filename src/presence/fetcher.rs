use std::sync::Arc;

use crate::cache::models::presence::{PresenceRecord, TrackInfo};
use crate::cache::operations::presence::{PresenceStore, WriteOutcome};
use crate::presence::directory::SocialDirectory;
use crate::queue::WorkItem;
use crate::spotify::{PlaybackProvider, PlaybackState, SpotifyApiError};
use crate::utils::now_ts;

/// 令牌到期前多久就主动刷新（秒）
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// 单个工作项的处理结果
///
/// Stored 与 Dropped 都确认消息；Retryable 留待队列重新投递。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Stored,
    Retryable,
    Dropped,
}

impl FetchOutcome {
    /// 是否应确认（删除）队列消息
    pub fn should_ack(&self) -> bool {
        !matches!(self, FetchOutcome::Retryable)
    }
}

/// 抓取器：队列消费者，向音乐服务查询播放状态并写入存储
///
/// 自身只在 401 时做一次刷新重试，其余重试全部交给队列重投，
/// 由可见性窗口对整个工作池的重试做天然限速。
pub struct PresenceFetcher {
    provider: Arc<dyn PlaybackProvider>,
    directory: Arc<dyn SocialDirectory>,
    store: Arc<dyn PresenceStore>,
}

impl PresenceFetcher {
    pub fn new(
        provider: Arc<dyn PlaybackProvider>,
        directory: Arc<dyn SocialDirectory>,
        store: Arc<dyn PresenceStore>,
    ) -> Self {
        Self {
            provider,
            directory,
            store,
        }
    }

    pub async fn process(&self, item: &WorkItem) -> FetchOutcome {
        tracing::debug!("Processing presence for user {}", item.user_id);

        let user = match self.directory.find_user(&item.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!("User {} not found during presence fetch", item.user_id);
                return FetchOutcome::Dropped;
            }
            Err(e) => {
                tracing::error!("Failed to load user {}: {}", item.user_id, e);
                return FetchOutcome::Dropped;
            }
        };

        let (mut access_token, refresh_token) = match (user.access_token, user.refresh_token) {
            (Some(access), Some(refresh)) => (access, refresh),
            _ => {
                tracing::warn!("User {} has no tokens", item.user_id);
                return FetchOutcome::Dropped;
            }
        };

        // 到期前5分钟内先行刷新，刷新后的凭据在调用前落库
        if now_ts() >= user.token_expires_at - TOKEN_REFRESH_MARGIN_SECS {
            tracing::debug!("Token expiring soon for user {}, refreshing", item.user_id);
            match self.refresh_and_store(&item.user_id, &refresh_token).await {
                Ok(token) => access_token = token,
                Err(SpotifyApiError::RateLimited { .. }) => {
                    tracing::warn!("Rate limited refreshing token for user {}", item.user_id);
                    return FetchOutcome::Retryable;
                }
                Err(e) => {
                    tracing::error!("Token refresh failed for user {}: {}", item.user_id, e);
                    return FetchOutcome::Dropped;
                }
            }
        }

        let playback = match self.provider.currently_playing(&access_token).await {
            Ok(playback) => playback,
            Err(SpotifyApiError::RateLimited { .. }) => {
                tracing::warn!("Rate limited fetching playback for user {}", item.user_id);
                return FetchOutcome::Retryable;
            }
            Err(SpotifyApiError::Unauthorized) => {
                // 恰好一次刷新重试；再失败则丢弃，需要用户重新授权
                match self.refresh_and_store(&item.user_id, &refresh_token).await {
                    Ok(token) => match self.provider.currently_playing(&token).await {
                        Ok(playback) => playback,
                        Err(SpotifyApiError::RateLimited { .. }) => {
                            return FetchOutcome::Retryable;
                        }
                        Err(e) => {
                            tracing::error!(
                                "Playback fetch failed after refresh for user {}: {}",
                                item.user_id,
                                e
                            );
                            return FetchOutcome::Dropped;
                        }
                    },
                    Err(e) => {
                        tracing::error!("Token refresh failed for user {}: {}", item.user_id, e);
                        return FetchOutcome::Dropped;
                    }
                }
            }
            Err(e) => {
                tracing::error!("Playback fetch failed for user {}: {}", item.user_id, e);
                return FetchOutcome::Dropped;
            }
        };

        let record = build_record(item, playback, now_ts());

        match self.store.write(&record).await {
            // 被更新的并发写入拒绝也视为成功：状态已是最新
            Ok(WriteOutcome::Stored) | Ok(WriteOutcome::Stale) => {
                tracing::info!(
                    "Presence updated for user {} (playing: {})",
                    item.user_id,
                    record.is_playing
                );
                FetchOutcome::Stored
            }
            Err(e) => {
                tracing::error!("Failed to store presence for user {}: {}", item.user_id, e);
                FetchOutcome::Dropped
            }
        }
    }

    async fn refresh_and_store(
        &self,
        user_id: &str,
        refresh_token: &str,
    ) -> Result<String, SpotifyApiError> {
        let refreshed = self.provider.refresh_token(refresh_token).await?;

        let expires_at = now_ts() + refreshed.expires_in;
        self.directory
            .save_access_token(user_id, &refreshed.access_token, expires_at)
            .await
            .map_err(|e| SpotifyApiError::Api {
                status: 0,
                message: format!("failed to persist refreshed token: {}", e),
            })?;

        Ok(refreshed.access_token)
    }
}

/// 把供应方响应转换为存储记录；无活跃播放时记为 is_playing = false
fn build_record(item: &WorkItem, playback: Option<PlaybackState>, now: i64) -> PresenceRecord {
    let playing = match playback {
        Some(state) if state.is_playing => state,
        _ => return PresenceRecord::not_playing(&item.user_id, &item.spotify_id, now),
    };

    let track = playing.item.map(|track| TrackInfo {
        track_id: track.id,
        track_name: track.name,
        artist_name: track.artists.into_iter().next().and_then(|a| a.name),
        album_name: track.album.as_ref().and_then(|a| a.name.clone()),
        album_image_url: track
            .album
            .and_then(|a| a.images.into_iter().next().map(|i| i.url)),
        progress_ms: playing.progress_ms,
        duration_ms: track.duration_ms,
    });

    PresenceRecord {
        user_id: item.user_id.clone(),
        spotify_id: item.spotify_id.clone(),
        is_playing: true,
        track,
        updated_at: now,
    }
}
