use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use crate::cache::operations::presence::RedisPresenceStore;
use crate::presence::discovery::DiscoveryService;
use crate::presence::fetcher::PresenceFetcher;
use crate::presence::notifier::ChangeNotifier;
use crate::queue::WorkQueue;

/// 队列为空时消费者的等待间隔
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 回收超时消息的扫描间隔
const RECLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// 周期触发发现运行
///
/// 单次运行失败只记录，等待下一个调度周期（调度器自身的重试语义）。
pub fn spawn_discovery(discovery: Arc<DiscoveryService>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = discovery.run().await {
                tracing::error!("Discovery run failed: {}", e);
            }
        }
    });
}

/// 启动 N 个并行的抓取消费者
pub fn spawn_fetch_workers(
    count: u32,
    queue: Arc<dyn WorkQueue>,
    fetcher: Arc<PresenceFetcher>,
) {
    for worker_id in 0..count {
        let queue = queue.clone();
        let fetcher = fetcher.clone();
        tokio::spawn(async move {
            tracing::info!("Fetch worker {} started", worker_id);
            loop {
                let delivery = match queue.receive().await {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => {
                        tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                        continue;
                    }
                    Err(e) => {
                        tracing::error!("Worker {} failed to receive: {}", worker_id, e);
                        tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                        continue;
                    }
                };

                let outcome = fetcher.process(delivery.item()).await;

                // Retryable 故意不确认，等可见性窗口过期后重新投递
                if outcome.should_ack() {
                    if let Err(e) = queue.ack(&delivery).await {
                        tracing::error!("Worker {} failed to ack: {}", worker_id, e);
                    }
                }
            }
        });
    }
}

/// 周期回收超过可见性窗口仍未确认的消息
pub fn spawn_queue_reclaimer(queue: Arc<dyn WorkQueue>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RECLAIM_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = queue.reclaim_expired().await {
                tracing::error!("Queue reclaim failed: {}", e);
            }
        }
    });
}

/// 订阅变更流并逐条通知
pub fn spawn_change_notifier(store: Arc<RedisPresenceStore>, notifier: Arc<ChangeNotifier>) {
    tokio::spawn(async move {
        let mut changes = store.subscribe();
        loop {
            match changes.recv().await {
                Ok(record) => {
                    notifier.handle_change(&record).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    // 断开的客户端会在重连时重新同步，跳过积压是可接受的
                    tracing::warn!("Change notifier lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => {
                    tracing::info!("Change stream closed, notifier stopping");
                    break;
                }
            }
        }
    });
}
