use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tokio::time::interval;
use tracing::{debug, info, warn};

use statuswatch_core::MonitorResult;
use statuswatch_domain::checker::Checker;
use statuswatch_domain::entities::{CheckResult, CheckTask, ServiceCheck};
use statuswatch_domain::repositories::{
    CheckResultRepository, CompleteOutcome, FailOutcome, ServiceRepository, TaskQueue,
};
use statuswatch_infrastructure::MetricsCollector;

use crate::status::StatusService;

/// Worker构建器
pub struct CheckWorkerBuilder {
    worker_id: Option<String>,
    task_queue: Arc<dyn TaskQueue>,
    service_repo: Arc<dyn ServiceRepository>,
    result_repo: Arc<dyn CheckResultRepository>,
    status: Arc<StatusService>,
    checker: Arc<dyn Checker>,
    metrics: Arc<MetricsCollector>,
    batch_size: usize,
    lease_seconds: i64,
    concurrency: usize,
    per_service_concurrency: usize,
}

impl CheckWorkerBuilder {
    pub fn new(
        task_queue: Arc<dyn TaskQueue>,
        service_repo: Arc<dyn ServiceRepository>,
        result_repo: Arc<dyn CheckResultRepository>,
        status: Arc<StatusService>,
        checker: Arc<dyn Checker>,
    ) -> Self {
        Self {
            worker_id: None,
            task_queue,
            service_repo,
            result_repo,
            status,
            checker,
            metrics: Arc::new(MetricsCollector::new()),
            batch_size: 100,
            lease_seconds: 30,
            concurrency: 200,
            per_service_concurrency: 10,
        }
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        let worker_id = worker_id.into();
        if !worker_id.is_empty() {
            self.worker_id = Some(worker_id);
        }
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn lease_seconds(mut self, lease_seconds: i64) -> Self {
        self.lease_seconds = lease_seconds;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn per_service_concurrency(mut self, per_service_concurrency: usize) -> Self {
        self.per_service_concurrency = per_service_concurrency;
        self
    }

    pub fn build(self) -> CheckWorker {
        CheckWorker {
            worker_id: self.worker_id.unwrap_or_else(default_worker_id),
            task_queue: self.task_queue,
            service_repo: self.service_repo,
            result_repo: self.result_repo,
            status: self.status,
            checker: self.checker,
            metrics: self.metrics,
            batch_size: self.batch_size,
            lease_duration: chrono::Duration::seconds(self.lease_seconds),
            global_slots: Arc::new(Semaphore::new(self.concurrency)),
            service_slots: Arc::new(RwLock::new(HashMap::new())),
            per_service_concurrency: self.per_service_concurrency,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// 检查Worker
///
/// 轮询任务队列、领取到期任务并在并发限额内执行检查。
/// 轮询循环本身从不等待在途检查结束。
pub struct CheckWorker {
    worker_id: String,
    task_queue: Arc<dyn TaskQueue>,
    service_repo: Arc<dyn ServiceRepository>,
    result_repo: Arc<dyn CheckResultRepository>,
    status: Arc<StatusService>,
    checker: Arc<dyn Checker>,
    metrics: Arc<MetricsCollector>,
    batch_size: usize,
    lease_duration: chrono::Duration,
    /// 全局并发额度
    global_slots: Arc<Semaphore>,
    /// 每个服务各自的并发额度，防止单个慢服务占满全部槽位
    service_slots: Arc<RwLock<HashMap<i64, Arc<Semaphore>>>>,
    per_service_concurrency: usize,
    in_flight: Arc<AtomicUsize>,
}

struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

fn default_worker_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{host}-{}", &uuid[..12])
}

impl CheckWorker {
    pub fn builder(
        task_queue: Arc<dyn TaskQueue>,
        service_repo: Arc<dyn ServiceRepository>,
        result_repo: Arc<dyn CheckResultRepository>,
        status: Arc<StatusService>,
        checker: Arc<dyn Checker>,
    ) -> CheckWorkerBuilder {
        CheckWorkerBuilder::new(task_queue, service_repo, result_repo, status, checker)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 当前在途的检查数
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 等待全部在途检查结束
    pub async fn wait_for_idle(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// 轮询循环，收到关闭信号后等待在途检查结束再退出
    pub async fn run(&self, poll_duration: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Worker {} 启动，批大小 {}，租约 {}s",
            self.worker_id,
            self.batch_size,
            self.lease_duration.num_seconds()
        );
        let mut poll = interval(poll_duration);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.poll_once(Utc::now()).await {
                        warn!("任务轮询失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Worker {} 收到停止信号", self.worker_id);
                    break;
                }
            }
        }

        // 有限等待在途检查收尾，租约回收兜底剩余任务
        if tokio::time::timeout(Duration::from_secs(30), self.wait_for_idle())
            .await
            .is_err()
        {
            warn!(
                "Worker {} 等待在途检查超时，剩余 {} 个",
                self.worker_id,
                self.in_flight()
            );
        }
        info!("Worker {} 已停止", self.worker_id);
    }

    /// 领取一批到期任务并派发执行，返回领取数量
    ///
    /// 派发是投递到运行时后立即返回，不等待检查完成。
    pub async fn poll_once(&self, now: chrono::DateTime<Utc>) -> MonitorResult<usize> {
        // 顺手收回过期租约
        let reclaimed = self.task_queue.reclaim_expired(now).await?;
        self.metrics.record_leases_reclaimed(reclaimed);

        let leased = self
            .task_queue
            .lease_batch(&self.worker_id, now, self.batch_size, self.lease_duration)
            .await?;
        if leased.is_empty() {
            return Ok(0);
        }

        self.metrics.record_lease_batch(leased.len());
        let count = leased.len();

        for task in leased {
            let worker = self.clone();
            let guard = InFlightGuard::new(self.in_flight.clone());
            tokio::spawn(async move {
                let _guard = guard;
                worker.process_task(task).await;
            });
        }

        Ok(count)
    }

    async fn service_slot(&self, service_id: i64) -> Arc<Semaphore> {
        {
            let slots = self.service_slots.read().await;
            if let Some(slot) = slots.get(&service_id) {
                return slot.clone();
            }
        }
        let mut slots = self.service_slots.write().await;
        slots
            .entry(service_id)
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_service_concurrency)))
            .clone()
    }

    async fn process_task(&self, task: CheckTask) {
        // 服务额度耗尽时提前释放，不把任务握到租约过期
        let service_slot = self.service_slot(task.service_id).await;
        let service_permit = match service_slot.try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(
                    "服务 {} 并发额度耗尽，任务 {} 释放回队列",
                    task.service_id, task.id
                );
                self.metrics.record_task_released();
                if let Err(e) = self.task_queue.release(task.id, &self.worker_id).await {
                    warn!("释放任务 {} 失败: {}", task.id, e);
                }
                return;
            }
        };

        let global_permit = match self.global_slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        // 两个许可随作用域结束无条件归还
        let _permits = (service_permit, global_permit);

        let check = match self.service_repo.get_check(task.check_id).await {
            Ok(Some(check)) if check.enabled => check,
            Ok(_) => {
                // 检查已删除或停用，任务按完成处理
                debug!("任务 {} 对应的检查已不存在或停用", task.id);
                if let Err(e) = self.task_queue.complete(task.id, &self.worker_id).await {
                    warn!("完成任务 {} 失败: {}", task.id, e);
                }
                return;
            }
            Err(e) => {
                warn!("读取任务 {} 的检查配置失败: {}", task.id, e);
                self.finish_failure(&task, task.check_key.clone()).await;
                return;
            }
        };

        let timeout = Duration::from_secs_f64(check.timeout_seconds);
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(timeout, self.checker.execute(&check)).await;
        let duration = started.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok(result)) => {
                self.metrics.record_check_execution(duration, true);
                self.finish_success(&task, &check, result).await;
            }
            Ok(Err(e)) => {
                self.metrics.record_check_execution(duration, false);
                warn!("检查 {} 执行失败: {}", check.check_key, e);
                self.finish_failure(&task, check.check_key.clone()).await;
            }
            Err(_) => {
                self.metrics.record_check_execution(duration, false);
                warn!(
                    "检查 {} 执行超时（{:.1}s）",
                    check.check_key, check.timeout_seconds
                );
                self.finish_failure(&task, check.check_key.clone()).await;
            }
        }
    }

    async fn finish_success(&self, task: &CheckTask, check: &ServiceCheck, result: CheckResult) {
        match self.task_queue.complete(task.id, &self.worker_id).await {
            Ok(CompleteOutcome::Completed) => {
                if let Err(e) = self
                    .result_repo
                    .record(task.id, task.service_id, check.id, &result)
                    .await
                {
                    warn!("写入任务 {} 的结果失败: {}", task.id, e);
                    return;
                }
                if let Err(e) = self.status.recompute(task.service_id, result.observed_at).await {
                    warn!("重算服务 {} 快照失败: {}", task.service_id, e);
                }
                debug!("任务 {} 完成: {}", task.id, result.status);
            }
            Ok(CompleteOutcome::LostLease) => {
                // 慢 worker 的迟到结果被丢弃，接管方会产出自己的结果
                debug!("任务 {} 的租约已转移，结果被丢弃", task.id);
            }
            Err(e) => {
                warn!("完成任务 {} 失败: {}", task.id, e);
            }
        }
    }

    async fn finish_failure(&self, task: &CheckTask, check_key: String) {
        let now = Utc::now();
        match self.task_queue.fail(task.id, &self.worker_id, now).await {
            Ok(FailOutcome::Retried { next_attempt_at }) => {
                debug!("任务 {} 将于 {} 重试", task.id, next_attempt_at);
            }
            Ok(FailOutcome::DeadLettered) => {
                self.metrics.record_task_dead_lettered();
                warn!("任务 {} 重试耗尽，写入兜底 down 结果", task.id);
                let synthetic =
                    CheckResult::max_attempts_exceeded(check_key, now, task.max_attempts);
                if let Err(e) = self
                    .result_repo
                    .record(task.id, task.service_id, task.check_id, &synthetic)
                    .await
                {
                    warn!("写入任务 {} 的兜底结果失败: {}", task.id, e);
                    return;
                }
                if let Err(e) = self.status.recompute(task.service_id, now).await {
                    warn!("重算服务 {} 快照失败: {}", task.service_id, e);
                }
            }
            Ok(FailOutcome::LostLease) => {
                debug!("任务 {} 的租约已转移，失败上报被忽略", task.id);
            }
            Err(e) => {
                warn!("上报任务 {} 失败状态时出错: {}", task.id, e);
            }
        }
    }
}

// 在异步任务中共享使用
impl Clone for CheckWorker {
    fn clone(&self) -> Self {
        Self {
            worker_id: self.worker_id.clone(),
            task_queue: Arc::clone(&self.task_queue),
            service_repo: Arc::clone(&self.service_repo),
            result_repo: Arc::clone(&self.result_repo),
            status: Arc::clone(&self.status),
            checker: Arc::clone(&self.checker),
            metrics: Arc::clone(&self.metrics),
            batch_size: self.batch_size,
            lease_duration: self.lease_duration,
            global_slots: Arc::clone(&self.global_slots),
            service_slots: Arc::clone(&self.service_slots),
            per_service_concurrency: self.per_service_concurrency,
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}
