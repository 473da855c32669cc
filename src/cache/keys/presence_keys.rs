/// 在线状态缓存键前缀
const PRESENCE_PREFIX: &str = "presence:user:";

/// 生成用户在线状态键
pub fn presence_key(user_id: &str) -> String {
    format!("{}{}", PRESENCE_PREFIX, user_id)
}
