// 缓存模块
// 包含 Redis 中的在线状态存储与连接注册表

pub mod keys;
pub mod models;
pub mod operations;

// 重新导出常用类型，方便其他模块使用
pub use models::connection::ConnectionEntry;
pub use models::presence::{PresenceRecord, TrackInfo};
