/// 待处理队列（就绪列表）
pub const POLL_QUEUE_READY: &str = "queue:poll:ready";

/// 处理中列表（已投递未确认的消息）
pub const POLL_QUEUE_PROCESSING: &str = "queue:poll:processing";

/// 可见性超时截止时间集合（score 为截止时间戳）
pub const POLL_QUEUE_DEADLINES: &str = "queue:poll:deadlines";
