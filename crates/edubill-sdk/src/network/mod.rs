//! 连接状态监控
//!
//! 只关心「能否访问远端」这一个布尔状态；状态切换通过 broadcast 通知订阅者
//! （同步管理器据此在 离线 → 在线 时立即触发同步）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 网络状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    Online,
    Offline,
}

/// 网络状态变化事件
#[derive(Debug, Clone)]
pub struct NetworkStatusEvent {
    pub old_status: NetworkStatus,
    pub new_status: NetworkStatus,
    /// UTC 毫秒时间戳
    pub timestamp: i64,
}

impl NetworkStatusEvent {
    /// 是否为 离线 → 在线 的恢复事件
    pub fn is_reconnect(&self) -> bool {
        self.old_status == NetworkStatus::Offline && self.new_status == NetworkStatus::Online
    }
}

/// 连通性探测（由远端客户端或平台层实现）
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// 远端当前是否可达
    async fn probe(&self) -> bool;
}

/// 连接状态管理器
#[derive(Debug)]
pub struct ConnectionManager {
    status_sender: broadcast::Sender<NetworkStatusEvent>,
    current_status: Arc<RwLock<NetworkStatus>>,
    probe_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(initial: NetworkStatus) -> Self {
        let (status_sender, _) = broadcast::channel(64);
        Self {
            status_sender,
            current_status: Arc::new(RwLock::new(initial)),
            probe_task: parking_lot::Mutex::new(None),
        }
    }

    pub async fn status(&self) -> NetworkStatus {
        *self.current_status.read().await
    }

    pub async fn is_online(&self) -> bool {
        self.status().await == NetworkStatus::Online
    }

    /// 更新状态；只有真正发生切换时才广播
    pub async fn set_status(&self, new_status: NetworkStatus) {
        Self::apply_status(&self.current_status, &self.status_sender, new_status).await;
    }

    pub async fn set_online(&self, online: bool) {
        let status = if online { NetworkStatus::Online } else { NetworkStatus::Offline };
        self.set_status(status).await;
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkStatusEvent> {
        self.status_sender.subscribe()
    }

    /// 启动周期性探测；重复调用会替换之前的探测任务
    pub fn start_probe(&self, interval: Duration, probe: Arc<dyn ConnectivityProbe>) {
        let current_status = self.current_status.clone();
        let sender = self.status_sender.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reachable = probe.probe().await;
                let status = if reachable { NetworkStatus::Online } else { NetworkStatus::Offline };
                debug!("连通性探测结果: {:?}", status);
                Self::apply_status(&current_status, &sender, status).await;
            }
        });

        if let Some(previous) = self.probe_task.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_probe(&self) {
        if let Some(handle) = self.probe_task.lock().take() {
            handle.abort();
        }
    }

    async fn apply_status(
        current_status: &RwLock<NetworkStatus>,
        sender: &broadcast::Sender<NetworkStatusEvent>,
        new_status: NetworkStatus,
    ) {
        let old_status = {
            let mut status = current_status.write().await;
            let old = *status;
            *status = new_status;
            old
        };
        if old_status == new_status {
            return;
        }
        info!("🌐 网络状态变化: {:?} -> {:?}", old_status, new_status);
        let _ = sender.send(NetworkStatusEvent {
            old_status,
            new_status,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop_probe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagProbe(Arc<AtomicBool>);

    #[async_trait]
    impl ConnectivityProbe for FlagProbe {
        async fn probe(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn broadcasts_only_real_transitions() {
        let manager = ConnectionManager::new(NetworkStatus::Offline);
        let mut rx = manager.subscribe();

        manager.set_online(false).await;
        manager.set_online(true).await;
        manager.set_online(true).await;

        let event = rx.recv().await.unwrap();
        assert!(event.is_reconnect());
        assert!(rx.try_recv().is_err());
        assert!(manager.is_online().await);
    }

    #[tokio::test]
    async fn probe_drives_status() {
        let manager = ConnectionManager::new(NetworkStatus::Offline);
        let mut rx = manager.subscribe();
        let flag = Arc::new(AtomicBool::new(true));
        manager.start_probe(Duration::from_millis(10), Arc::new(FlagProbe(flag.clone())));

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.new_status, NetworkStatus::Online);

        flag.store(false, Ordering::SeqCst);
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.new_status, NetworkStatus::Offline);
        manager.stop_probe();
    }
}
