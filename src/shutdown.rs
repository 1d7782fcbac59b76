use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

/// 关闭信号分发器
///
/// 调度器与 Worker 各自订阅一个接收端；信号只会发出一次，
/// 晚于关闭时刻的订阅者也能立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    tx: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self {
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        let rx = self.tx.subscribe();
        if !self.fired.load(Ordering::SeqCst) {
            return rx;
        }
        // 订阅发生在信号之后，补发一个已触发的接收端
        let (late_tx, late_rx) = broadcast::channel(1);
        let _ = late_tx.send(());
        late_rx
    }

    /// 广播关闭信号，重复调用是无害的空操作
    pub fn shutdown(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("关闭信号已经发出过");
            return;
        }
        info!("向 {} 个订阅者广播关闭信号", self.tx.receiver_count());
        let _ = self.tx.send(());
    }

    pub fn is_shutdown(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_subscribers_receive_signal() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown());

        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();
        manager.shutdown();

        assert!(timeout(Duration::from_millis(100), rx1.recv()).await.is_ok());
        assert!(timeout(Duration::from_millis(100), rx2.recv()).await.is_ok());
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_signal() {
        let manager = ShutdownManager::new();
        manager.shutdown();

        let mut rx = manager.subscribe();
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_repeated_shutdown_is_noop() {
        let manager = ShutdownManager::new();
        manager.shutdown();
        manager.shutdown();
        assert!(manager.is_shutdown());
    }
}
