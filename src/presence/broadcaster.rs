use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::operations::connection::ConnectionRegistry;
use crate::ws::transport::{ConnectionTransport, TransportSendError};

/// 广播器：把载荷投递到受众的每一个活跃连接
///
/// 传输客户端在进程启动时构造一次并显式传入，不做惰性全局初始化。
pub struct Broadcaster {
    registry: Arc<dyn ConnectionRegistry>,
    transport: Arc<dyn ConnectionTransport>,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        transport: Arc<dyn ConnectionTransport>,
    ) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// 逐个连接投递，返回成功数
    ///
    /// 单条连接的失败不会中断其余连接或其余受众的投递；
    /// 对端离线的连接当场从注册表删除（自愈）。
    pub async fn broadcast(&self, audience: &HashSet<String>, payload: &str) -> usize {
        let mut delivered = 0;

        for recipient_id in audience {
            let connections = match self.registry.connections_for(recipient_id).await {
                Ok(connections) => connections,
                Err(e) => {
                    tracing::error!(
                        "Failed to resolve connections for user {}: {}",
                        recipient_id,
                        e
                    );
                    continue;
                }
            };

            for connection_id in connections {
                match self.transport.send(&connection_id, payload).await {
                    Ok(()) => delivered += 1,
                    Err(TransportSendError::PeerGone) => {
                        tracing::info!("Removing stale connection {}", connection_id);
                        if let Err(e) = self.registry.remove(&connection_id).await {
                            tracing::error!(
                                "Failed to remove stale connection {}: {}",
                                connection_id,
                                e
                            );
                        }
                    }
                    Err(TransportSendError::Transport(reason)) => {
                        tracing::error!(
                            "Failed to deliver to connection {}: {}",
                            connection_id,
                            reason
                        );
                    }
                }
            }
        }

        delivered
    }
}
