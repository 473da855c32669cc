// 在线状态流水线
// 发现 → 队列 → 抓取 → 存储 → 变更通知 → 广播

pub mod broadcaster;
pub mod directory;
pub mod discovery;
pub mod fetcher;
pub mod notifier;
pub mod worker;

#[cfg(test)]
pub mod testing;
