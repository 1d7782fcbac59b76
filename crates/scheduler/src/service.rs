use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use statuswatch_core::MonitorResult;
use statuswatch_domain::entities::NewCheckTask;
use statuswatch_domain::repositories::{EnqueueOutcome, ServiceRepository, TaskQueue};
use statuswatch_infrastructure::MetricsCollector;

/// 检查调度器
///
/// 周期性扫描到期的服务检查并入队；自身不执行任何检查。
pub struct CheckScheduler {
    service_repo: Arc<dyn ServiceRepository>,
    task_queue: Arc<dyn TaskQueue>,
    metrics: Arc<MetricsCollector>,
    /// 单次扫描最多入队的检查数，超出的留给下一个扫描周期
    batch_size: usize,
    max_attempts: i32,
}

impl CheckScheduler {
    pub fn new(
        service_repo: Arc<dyn ServiceRepository>,
        task_queue: Arc<dyn TaskQueue>,
        metrics: Arc<MetricsCollector>,
        batch_size: usize,
        max_attempts: i32,
    ) -> Self {
        Self {
            service_repo,
            task_queue,
            metrics,
            batch_size,
            max_attempts,
        }
    }

    /// 调度循环，收到关闭信号后退出
    pub async fn run(
        &self,
        tick_duration: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut tick = interval(tick_duration);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let started = std::time::Instant::now();
                    match self.scan_and_enqueue(Utc::now()).await {
                        Ok(enqueued) => {
                            self.metrics
                                .record_scheduler_tick(started.elapsed().as_secs_f64(), enqueued);
                        }
                        Err(e) => {
                            warn!("调度扫描失败: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("调度器收到停止信号");
                    break;
                }
            }
        }
    }

    /// 扫描到期检查并入队，返回实际入队数量
    ///
    /// 单个检查入队失败只记录日志并跳过，不中断本次扫描。
    pub async fn scan_and_enqueue(&self, now: DateTime<Utc>) -> MonitorResult<usize> {
        let due_checks = self.service_repo.list_due_checks(now, self.batch_size).await?;
        if due_checks.is_empty() {
            return Ok(0);
        }

        let mut enqueued = 0;
        for check in due_checks {
            let scheduled_for = check.next_due_at;
            let task = NewCheckTask {
                service_id: check.service_id,
                check_id: check.id,
                check_key: check.check_key.clone(),
                scheduled_for,
                max_attempts: self.max_attempts,
            };

            match self.task_queue.enqueue(task).await {
                Ok(EnqueueOutcome::Enqueued(task_id)) => {
                    debug!(
                        "检查 {} 已入队: task {} @ {}",
                        check.check_key, task_id, scheduled_for
                    );
                    enqueued += 1;
                }
                Ok(EnqueueOutcome::AlreadyExists) => {
                    debug!("检查 {} 在该应检时刻已有任务，跳过", check.check_key);
                }
                Err(e) => {
                    warn!("检查 {} 入队失败，跳过: {}", check.check_key, e);
                    continue;
                }
            }

            let next_due = next_due_after(scheduled_for, now, check.interval_seconds);
            if let Err(e) = self.service_repo.set_check_next_due(check.id, next_due).await {
                warn!("更新检查 {} 的下次应检时间失败: {}", check.id, e);
            }
        }

        info!("本次调度扫描完成，入队 {} 个检查任务", enqueued);
        Ok(enqueued)
    }
}

/// 上次应检时刻之后、晚于 now 的下一个应检时刻
///
/// 按整数倍间隔推进，落后多个周期时直接跳到未来，不补跑错过的周期。
pub(crate) fn next_due_after(
    previous_due: DateTime<Utc>,
    now: DateTime<Utc>,
    interval_seconds: i64,
) -> DateTime<Utc> {
    let step = chrono::Duration::seconds(interval_seconds.max(1));
    let mut next_due = previous_due;
    while next_due <= now {
        next_due += step;
    }
    next_due
}
