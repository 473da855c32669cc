use serde::{Deserialize, Serialize};

/// 连接记录的有效期（8小时）
pub const CONNECTION_TTL_SECS: u64 = 8 * 60 * 60;

/// 连接注册表条目
///
/// 一个用户可能有多个活跃连接（多设备/多标签页）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub connection_id: String,
    pub user_id: String,
    pub connected_at: i64, // Unix timestamp
}
