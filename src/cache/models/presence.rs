use serde::{Deserialize, Serialize};

/// 在线状态记录的有效期（24小时）
pub const PRESENCE_TTL_SECS: u64 = 24 * 60 * 60;

/// 正在播放的曲目信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub track_id: Option<String>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub album_image_url: Option<String>,
    pub progress_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

/// 用户在线状态记录
///
/// 每次成功抓取后整体覆写；updated_at 只允许前进，写入时做条件校验。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub spotify_id: String,
    pub is_playing: bool,
    pub track: Option<TrackInfo>,
    pub updated_at: i64, // Unix timestamp
}

impl PresenceRecord {
    /// 无播放时的记录（抓取成功但没有活跃播放）
    pub fn not_playing(user_id: &str, spotify_id: &str, updated_at: i64) -> Self {
        PresenceRecord {
            user_id: user_id.to_string(),
            spotify_id: spotify_id.to_string(),
            is_playing: false,
            track: None,
            updated_at,
        }
    }
}
