// 缓存键定义模块
// 统一管理 Redis 键的生成，避免键名散落各处

pub mod connection_keys;
pub mod presence_keys;
pub mod queue_keys;
