// 测试替身：流水线各接缝的内存实现

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cache::models::connection::ConnectionEntry;
use crate::cache::models::presence::{PRESENCE_TTL_SECS, PresenceRecord};
use crate::cache::operations::connection::ConnectionRegistry;
use crate::cache::operations::presence::{PresenceStore, WriteOutcome};
use crate::database::models::friendship::FriendEdge;
use crate::database::models::user::UserEntity;
use crate::presence::directory::SocialDirectory;
use crate::queue::{Delivery, QueueMessage, WorkItem, WorkQueue};
use crate::spotify::{
    PlaybackArtist, PlaybackItem, PlaybackProvider, PlaybackState, RefreshedToken,
    SpotifyApiError,
};
use crate::utils::now_ts;
use crate::ws::transport::{ConnectionTransport, TransportSendError};

/// 构造指定可见性、若干小时前活跃的用户
pub fn user_with_activity(user_id: &str, visibility: &str, hours_ago: i64) -> UserEntity {
    UserEntity {
        user_id: user_id.to_string(),
        display_name: Some(format!("User {}", user_id)),
        spotify_id: Some(format!("spotify-{}", user_id)),
        visibility: visibility.to_string(),
        access_token: Some("access".to_string()),
        refresh_token: Some("refresh".to_string()),
        token_expires_at: now_ts() + 3600,
        last_active_at: Utc::now() - Duration::hours(hours_ago),
    }
}

/// 构造带有效凭据的可分享用户
pub fn user_with_tokens(user_id: &str) -> UserEntity {
    user_with_activity(user_id, "friends", 1)
}

/// 构造正在播放指定曲目的播放状态
pub fn playing_state(track_id: &str) -> PlaybackState {
    PlaybackState {
        is_playing: true,
        progress_ms: Some(1000),
        item: Some(PlaybackItem {
            id: Some(track_id.to_string()),
            name: Some("Track".to_string()),
            duration_ms: Some(180_000),
            artists: vec![PlaybackArtist {
                name: Some("Artist".to_string()),
            }],
            album: None,
        }),
    }
}

/// 内存目录
pub struct MemoryDirectory {
    users: Mutex<HashMap<String, UserEntity>>,
    edges: Mutex<Vec<FriendEdge>>,
    sessions: Mutex<Vec<String>>,
    fail_batch_lookup: Mutex<bool>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            edges: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
            fail_batch_lookup: Mutex::new(false),
        }
    }

    /// 让后续的批量用户查询失败
    pub async fn fail_batch_lookups(&self) {
        *self.fail_batch_lookup.lock().await = true;
    }

    pub async fn insert_user(&self, user: UserEntity) {
        self.users.lock().await.insert(user.user_id.clone(), user);
    }

    pub async fn insert_edge(&self, user_id: &str, friend_id: &str) {
        self.edges.lock().await.push(FriendEdge {
            user_id: user_id.to_string(),
            friend_id: friend_id.to_string(),
        });
    }

    pub async fn insert_session_participant(&self, user_id: &str) {
        self.sessions.lock().await.push(user_id.to_string());
    }

    pub async fn get_user(&self, user_id: &str) -> Option<UserEntity> {
        self.users.lock().await.get(user_id).cloned()
    }
}

#[async_trait]
impl SocialDirectory for MemoryDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserEntity>, sqlx::Error> {
        Ok(self.users.lock().await.get(user_id).cloned())
    }

    async fn find_users(&self, user_ids: &[String]) -> Result<Vec<UserEntity>, sqlx::Error> {
        if *self.fail_batch_lookup.lock().await {
            return Err(sqlx::Error::PoolClosed);
        }
        let users = self.users.lock().await;
        Ok(user_ids
            .iter()
            .filter_map(|user_id| users.get(user_id).cloned())
            .collect())
    }

    async fn recent_shareable(
        &self,
        active_since: chrono::DateTime<Utc>,
    ) -> Result<Vec<UserEntity>, sqlx::Error> {
        let mut users: Vec<UserEntity> = self
            .users
            .lock()
            .await
            .values()
            .filter(|user| user.is_shareable() && user.last_active_at > active_since)
            .cloned()
            .collect();
        users.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(users)
    }

    async fn session_participants(&self) -> Result<Vec<String>, sqlx::Error> {
        Ok(self.sessions.lock().await.clone())
    }

    async fn friend_edges(&self) -> Result<Vec<FriendEdge>, sqlx::Error> {
        Ok(self.edges.lock().await.clone())
    }

    async fn friends_of(&self, user_id: &str) -> Result<Vec<String>, sqlx::Error> {
        Ok(self
            .edges
            .lock()
            .await
            .iter()
            .filter(|edge| edge.user_id == user_id)
            .map(|edge| edge.friend_id.clone())
            .collect())
    }

    async fn save_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        token_expires_at: i64,
    ) -> Result<(), sqlx::Error> {
        if let Some(user) = self.users.lock().await.get_mut(user_id) {
            user.access_token = Some(access_token.to_string());
            user.token_expires_at = token_expires_at;
        }
        Ok(())
    }
}

/// 内存在线状态存储，与 Redis 实现同样执行条件写入与TTL读取
pub struct MemoryPresenceStore {
    records: Mutex<HashMap<String, PresenceRecord>>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    pub async fn read_raw(&self, user_id: &str) -> Option<PresenceRecord> {
        self.records.lock().await.get(user_id).cloned()
    }

    pub async fn record_count(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn write(&self, record: &PresenceRecord) -> Result<WriteOutcome, redis::RedisError> {
        let mut records = self.records.lock().await;
        if let Some(existing) = records.get(&record.user_id) {
            if existing.updated_at >= record.updated_at {
                return Ok(WriteOutcome::Stale);
            }
        }
        records.insert(record.user_id.clone(), record.clone());
        Ok(WriteOutcome::Stored)
    }

    async fn read(&self, user_id: &str) -> Result<Option<PresenceRecord>, redis::RedisError> {
        let records = self.records.lock().await;
        // TTL 语义：过期记录视作不存在
        Ok(records
            .get(user_id)
            .filter(|record| now_ts() < record.updated_at + PRESENCE_TTL_SECS as i64)
            .cloned())
    }
}

/// 内存工作队列，可见性窗口可配置为0以便测试立即回收
pub struct MemoryQueue {
    visibility_secs: i64,
    ready: Mutex<VecDeque<String>>,
    in_flight: Mutex<HashMap<String, i64>>,
    history: Mutex<Vec<WorkItem>>,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryQueue {
    pub fn new(visibility_secs: i64) -> Self {
        Self {
            visibility_secs,
            ready: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            rejected: Mutex::new(HashSet::new()),
        }
    }

    /// 所有曾经入队的工作项（含重复入队）
    pub async fn queued_items(&self) -> Vec<WorkItem> {
        self.history.lock().await.clone()
    }

    /// 让指定用户的入队失败
    pub async fn reject_user(&self, user_id: &str) {
        self.rejected.lock().await.insert(user_id.to_string());
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, item: &WorkItem) -> Result<(), redis::RedisError> {
        if self.rejected.lock().await.contains(&item.user_id) {
            return Err(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "enqueue rejected",
            )));
        }
        let message = QueueMessage {
            message_id: Uuid::new_v4().to_string(),
            item: item.clone(),
        };
        let raw = serde_json::to_string(&message).map_err(|e| {
            redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Serialization error",
                e.to_string(),
            ))
        })?;
        self.ready.lock().await.push_back(raw);
        self.history.lock().await.push(item.clone());
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, redis::RedisError> {
        let raw = match self.ready.lock().await.pop_front() {
            Some(raw) => raw,
            None => return Ok(None),
        };
        self.in_flight
            .lock()
            .await
            .insert(raw.clone(), now_ts() + self.visibility_secs);
        let message: QueueMessage = serde_json::from_str(&raw).map_err(|e| {
            redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Deserialization error",
                e.to_string(),
            ))
        })?;
        Ok(Some(Delivery::new(message, raw)))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), redis::RedisError> {
        let raw = serde_json::to_string(&delivery.message).map_err(|e| {
            redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Serialization error",
                e.to_string(),
            ))
        })?;
        self.in_flight.lock().await.remove(&raw);
        Ok(())
    }

    async fn reclaim_expired(&self) -> Result<u32, redis::RedisError> {
        let mut in_flight = self.in_flight.lock().await;
        let now = now_ts();
        let expired: Vec<String> = in_flight
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(raw, _)| raw.clone())
            .collect();
        let mut ready = self.ready.lock().await;
        let mut reclaimed = 0;
        for raw in expired {
            in_flight.remove(&raw);
            ready.push_back(raw);
            reclaimed += 1;
        }
        Ok(reclaimed)
    }
}

/// 内存连接注册表，保持每个用户连接的插入顺序
pub struct MemoryRegistry {
    by_user: Mutex<HashMap<String, Vec<String>>>,
    owners: Mutex<HashMap<String, String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            by_user: Mutex::new(HashMap::new()),
            owners: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ConnectionRegistry for MemoryRegistry {
    async fn register(&self, entry: &ConnectionEntry) -> Result<(), redis::RedisError> {
        self.by_user
            .lock()
            .await
            .entry(entry.user_id.clone())
            .or_default()
            .push(entry.connection_id.clone());
        self.owners
            .lock()
            .await
            .insert(entry.connection_id.clone(), entry.user_id.clone());
        Ok(())
    }

    async fn remove(&self, connection_id: &str) -> Result<(), redis::RedisError> {
        if let Some(user_id) = self.owners.lock().await.remove(connection_id) {
            if let Some(connections) = self.by_user.lock().await.get_mut(&user_id) {
                connections.retain(|id| id != connection_id);
            }
        }
        Ok(())
    }

    async fn connections_for(&self, user_id: &str) -> Result<Vec<String>, redis::RedisError> {
        Ok(self
            .by_user
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// 记录投递的传输替身；可把指定连接标记为离线或故障
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    gone: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            gone: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
        }
    }

    pub async fn mark_gone(&self, connection_id: &str) {
        self.gone.lock().await.push(connection_id.to_string());
    }

    pub async fn mark_failing(&self, connection_id: &str) {
        self.failing.lock().await.push(connection_id.to_string());
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl ConnectionTransport for RecordingTransport {
    async fn send(&self, connection_id: &str, payload: &str) -> Result<(), TransportSendError> {
        if self.gone.lock().await.iter().any(|id| id == connection_id) {
            return Err(TransportSendError::PeerGone);
        }
        if self.failing.lock().await.iter().any(|id| id == connection_id) {
            return Err(TransportSendError::Transport("send failed".to_string()));
        }
        self.sent
            .lock()
            .await
            .push((connection_id.to_string(), payload.to_string()));
        Ok(())
    }
}

/// 脚本化的播放供应方：按顺序弹出预置的响应
pub struct ScriptedProvider {
    playback: Mutex<VecDeque<Result<Option<PlaybackState>, SpotifyApiError>>>,
    refresh: Mutex<VecDeque<Result<RefreshedToken, SpotifyApiError>>>,
    refresh_calls: Mutex<u32>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            playback: Mutex::new(VecDeque::new()),
            refresh: Mutex::new(VecDeque::new()),
            refresh_calls: Mutex::new(0),
        }
    }

    pub async fn push_playing(&self, state: PlaybackState) {
        self.playback.lock().await.push_back(Ok(Some(state)));
    }

    pub async fn push_no_content(&self) {
        self.playback.lock().await.push_back(Ok(None));
    }

    pub async fn push_rate_limited(&self) {
        self.playback
            .lock()
            .await
            .push_back(Err(SpotifyApiError::RateLimited {
                retry_after_secs: Some(1),
            }));
    }

    pub async fn push_unauthorized(&self) {
        self.playback
            .lock()
            .await
            .push_back(Err(SpotifyApiError::Unauthorized));
    }

    pub async fn push_api_error(&self, status: u16) {
        self.playback.lock().await.push_back(Err(SpotifyApiError::Api {
            status,
            message: "upstream error".to_string(),
        }));
    }

    pub async fn push_refresh_ok(&self, access_token: &str, expires_in: i64) {
        self.refresh.lock().await.push_back(Ok(RefreshedToken {
            access_token: access_token.to_string(),
            expires_in,
        }));
    }

    pub async fn push_refresh_err(&self) {
        self.refresh
            .lock()
            .await
            .push_back(Err(SpotifyApiError::Unauthorized));
    }

    pub async fn refresh_calls(&self) -> u32 {
        *self.refresh_calls.lock().await
    }
}

#[async_trait]
impl PlaybackProvider for ScriptedProvider {
    async fn currently_playing(
        &self,
        _access_token: &str,
    ) -> Result<Option<PlaybackState>, SpotifyApiError> {
        self.playback
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(None))
    }

    async fn refresh_token(
        &self,
        _refresh_token: &str,
    ) -> Result<RefreshedToken, SpotifyApiError> {
        *self.refresh_calls.lock().await += 1;
        self.refresh
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(SpotifyApiError::Unauthorized))
    }
}
