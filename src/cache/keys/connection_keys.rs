/// 连接信息键前缀
const CONNECTION_INFO_PREFIX: &str = "conn:info:";

/// 用户连接集合键前缀
const USER_CONNECTIONS_PREFIX: &str = "conn:user:";

/// 生成连接信息键
pub fn connection_info_key(connection_id: &str) -> String {
    format!("{}{}", CONNECTION_INFO_PREFIX, connection_id)
}

/// 生成用户连接集合键
pub fn user_connections_key(user_id: &str) -> String {
    format!("{}{}", USER_CONNECTIONS_PREFIX, user_id)
}
