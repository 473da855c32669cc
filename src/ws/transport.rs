use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

/// 单条连接的发送超时，慢速对端不能拖住其余投递
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// 每条连接的出站缓冲容量
pub const OUTBOX_CAPACITY: usize = 64;

/// 投递失败的分类
#[derive(Debug)]
pub enum TransportSendError {
    /// 对端已离线，调用方应清理注册表
    PeerGone,
    /// 其他传输故障，记录后跳过该连接
    Transport(String),
}

/// 持久连接传输契约
#[async_trait]
pub trait ConnectionTransport: Send + Sync {
    async fn send(&self, connection_id: &str, payload: &str) -> Result<(), TransportSendError>;
}

/// 进程内传输：连接ID到各 WebSocket 会话出站信箱的映射
///
/// 进程启动时构造一次并显式传给广播器。
pub struct LocalTransport {
    outboxes: RwLock<HashMap<String, mpsc::Sender<String>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            outboxes: RwLock::new(HashMap::new()),
        }
    }

    /// 连接建立时挂载出站信箱
    pub async fn attach(&self, connection_id: &str, sender: mpsc::Sender<String>) {
        self.outboxes
            .write()
            .await
            .insert(connection_id.to_string(), sender);
    }

    /// 连接关闭时卸载
    pub async fn detach(&self, connection_id: &str) {
        self.outboxes.write().await.remove(connection_id);
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionTransport for LocalTransport {
    async fn send(&self, connection_id: &str, payload: &str) -> Result<(), TransportSendError> {
        let sender = {
            let outboxes = self.outboxes.read().await;
            match outboxes.get(connection_id) {
                Some(sender) => sender.clone(),
                None => return Err(TransportSendError::PeerGone),
            }
        };

        match tokio::time::timeout(SEND_TIMEOUT, sender.send(payload.to_string())).await {
            Ok(Ok(())) => Ok(()),
            // 接收端已关闭：会话已经结束
            Ok(Err(_)) => Err(TransportSendError::PeerGone),
            Err(_) => Err(TransportSendError::Transport("send timed out".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_to_unknown_connection_is_peer_gone() {
        let transport = LocalTransport::new();
        let result = transport.send("missing", "{}").await;
        assert!(matches!(result, Err(TransportSendError::PeerGone)));
    }

    #[tokio::test]
    async fn send_to_closed_outbox_is_peer_gone() {
        let transport = LocalTransport::new();
        let (tx, rx) = mpsc::channel(1);
        transport.attach("c1", tx).await;
        drop(rx);

        let result = transport.send("c1", "{}").await;
        assert!(matches!(result, Err(TransportSendError::PeerGone)));
    }

    #[tokio::test]
    async fn send_delivers_to_attached_outbox() {
        let transport = LocalTransport::new();
        let (tx, mut rx) = mpsc::channel(1);
        transport.attach("c1", tx).await;

        transport.send("c1", "hello").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");

        transport.detach("c1").await;
        let result = transport.send("c1", "again").await;
        assert!(matches!(result, Err(TransportSendError::PeerGone)));
    }
}
