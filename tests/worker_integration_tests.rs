use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use statuswatch_domain::checker::{Checker, CheckerError};
use statuswatch_domain::entities::{
    CheckResult, DependencyKind, IncidentStatus, ServiceCheck, ServiceStatus, TaskStatus,
};
use statuswatch_infrastructure::{
    MemoryIncidentRepository, MemoryResultRepository, MemoryServiceRepository,
    MemorySnapshotRepository, MemoryTaskQueue, MetricsCollector,
};
use statuswatch_scheduler::CheckScheduler;
use statuswatch_worker::{CheckWorker, StatusService};

struct Harness {
    repo: Arc<MemoryServiceRepository>,
    queue: Arc<MemoryTaskQueue>,
    results: Arc<MemoryResultRepository>,
    snapshots: Arc<MemorySnapshotRepository>,
    incidents: Arc<MemoryIncidentRepository>,
    scheduler: CheckScheduler,
    worker: CheckWorker,
}

fn harness(checker: Arc<dyn Checker>, per_service_concurrency: usize) -> Harness {
    let repo = Arc::new(MemoryServiceRepository::new());
    let queue = Arc::new(MemoryTaskQueue::new());
    let results = Arc::new(MemoryResultRepository::new());
    let snapshots = Arc::new(MemorySnapshotRepository::new());
    let incidents = Arc::new(MemoryIncidentRepository::new());
    let metrics = Arc::new(MetricsCollector::new());

    let scheduler = CheckScheduler::new(
        repo.clone(),
        queue.clone(),
        metrics.clone(),
        500,
        3,
    );

    let status = Arc::new(StatusService::new(
        repo.clone(),
        results.clone(),
        snapshots.clone(),
        incidents.clone(),
    ));
    let worker = CheckWorker::builder(
        queue.clone(),
        repo.clone(),
        results.clone(),
        status,
        checker,
    )
    .worker_id("worker-test")
    .metrics(metrics)
    .batch_size(100)
    .lease_seconds(30)
    .concurrency(50)
    .per_service_concurrency(per_service_concurrency)
    .build();

    Harness {
        repo,
        queue,
        results,
        snapshots,
        incidents,
        scheduler,
        worker,
    }
}

/// 按 check_key 回放预先编排的状态序列，耗尽后返回 fallback
struct ScriptedChecker {
    plan: Mutex<HashMap<String, VecDeque<ServiceStatus>>>,
    fallback: ServiceStatus,
}

impl ScriptedChecker {
    fn new(fallback: ServiceStatus) -> Self {
        Self {
            plan: Mutex::new(HashMap::new()),
            fallback,
        }
    }

    fn script(self, check_key: &str, statuses: &[ServiceStatus]) -> Self {
        self.plan
            .lock()
            .unwrap()
            .insert(check_key.to_string(), statuses.iter().copied().collect());
        self
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn execute(&self, check: &ServiceCheck) -> Result<CheckResult, CheckerError> {
        let status = {
            let mut plan = self.plan.lock().unwrap();
            plan.get_mut(&check.check_key)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(self.fallback)
        };
        Ok(CheckResult {
            check_key: check.check_key.clone(),
            status,
            observed_at: Utc::now(),
            latency_ms: Some(20),
            http_status: Some(200),
            error_code: None,
            error_message: None,
            metadata: serde_json::Value::Null,
        })
    }
}

/// 永远无法产出结果的检查器
struct FailingChecker;

#[async_trait]
impl Checker for FailingChecker {
    async fn execute(&self, _check: &ServiceCheck) -> Result<CheckResult, CheckerError> {
        Err(CheckerError::Transport("connection refused".to_string()))
    }
}

/// 统计并发峰值的检查器
struct TrackingChecker {
    current: AtomicUsize,
    max_seen: AtomicUsize,
}

impl TrackingChecker {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Checker for TrackingChecker {
    async fn execute(&self, check: &ServiceCheck) -> Result<CheckResult, CheckerError> {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(CheckResult::up(check.check_key.clone(), Utc::now()))
    }
}

#[tokio::test]
async fn test_end_to_end_check_flow() {
    let h = harness(Arc::new(ScriptedChecker::new(ServiceStatus::Up)), 10);

    let service = h.repo.add_service("gateway", "Gateway").await;
    h.repo
        .add_check(service.id, "http", "https://gw/health", 3600, 1.0, Utc::now())
        .await;

    assert_eq!(h.scheduler.scan_and_enqueue(Utc::now()).await.unwrap(), 1);
    assert_eq!(h.worker.poll_once(Utc::now()).await.unwrap(), 1);
    h.worker.wait_for_idle().await;

    let counts = h.queue.counts_by_status().await;
    assert_eq!(counts.get(&TaskStatus::Done), Some(&1));

    let results = h.results.all_for_service(service.id).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ServiceStatus::Up);

    let snapshots = h.snapshots.all_for_service(service.id).await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].raw_score, 100.0);
    assert_eq!(snapshots[0].effective_score, 100.0);
    assert_eq!(snapshots[0].status, ServiceStatus::Up);
    assert!(!snapshots[0].dependency_impacted);

    assert!(h.incidents.all_for_service(service.id).await.is_empty());
}

#[tokio::test]
async fn test_retry_exhaustion_emits_single_synthetic_down_result() {
    let h = harness(Arc::new(FailingChecker), 10);

    let service = h.repo.add_service("gateway", "Gateway").await;
    h.repo
        .add_check(service.id, "http", "https://gw/health", 3600, 1.0, Utc::now())
        .await;

    h.scheduler.scan_and_enqueue(Utc::now()).await.unwrap();

    // 三次失败耗尽重试；退避通过推进轮询时钟跳过
    let mut polled_total = 0;
    for round in 0..3 {
        let now = Utc::now() + ChronoDuration::seconds(round * 120);
        polled_total += h.worker.poll_once(now).await.unwrap();
        h.worker.wait_for_idle().await;
    }
    assert_eq!(polled_total, 3);

    let counts = h.queue.counts_by_status().await;
    assert_eq!(counts.get(&TaskStatus::Failed), Some(&1));

    // 只有一条兜底 down 结果，没有静默丢弃
    let results = h.results.all_for_service(service.id).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ServiceStatus::Down);
    assert_eq!(
        results[0].error_code.as_deref(),
        Some("max_attempts_exceeded")
    );

    let snapshots = h.snapshots.all_for_service(service.id).await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].raw_score, 0.0);
    assert_eq!(snapshots[0].status, ServiceStatus::Down);

    let incidents = h.incidents.all_for_service(service.id).await;
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].status, IncidentStatus::Open);
    assert_eq!(incidents[0].peak_severity, ServiceStatus::Down);
}

#[tokio::test]
async fn test_per_service_concurrency_is_bounded_with_early_release() {
    let checker = Arc::new(TrackingChecker::new());
    let h = harness(checker.clone(), 2);

    let service = h.repo.add_service("gateway", "Gateway").await;
    for i in 0..5 {
        h.repo
            .add_check(
                service.id,
                &format!("check-{i}"),
                "https://gw/health",
                3600,
                1.0,
                Utc::now(),
            )
            .await;
    }

    assert_eq!(h.scheduler.scan_and_enqueue(Utc::now()).await.unwrap(), 5);

    // 第一轮：5 个任务被领取，超出服务额度的被提前释放回队列
    assert_eq!(h.worker.poll_once(Utc::now()).await.unwrap(), 5);
    h.worker.wait_for_idle().await;

    let counts = h.queue.counts_by_status().await;
    let done_after_first = counts.get(&TaskStatus::Done).copied().unwrap_or(0);
    assert!(done_after_first <= 2, "单轮完成数不超过服务并发额度");
    assert_eq!(
        counts.get(&TaskStatus::Pending).copied().unwrap_or(0),
        5 - done_after_first,
        "被释放的任务应当回到 pending"
    );

    // 后续轮次消化剩余任务
    for _ in 0..10 {
        h.worker.poll_once(Utc::now()).await.unwrap();
        h.worker.wait_for_idle().await;
        let counts = h.queue.counts_by_status().await;
        if counts.get(&TaskStatus::Done) == Some(&5) {
            break;
        }
    }

    let counts = h.queue.counts_by_status().await;
    assert_eq!(counts.get(&TaskStatus::Done), Some(&5));
    assert!(checker.max_seen.load(Ordering::SeqCst) <= 2);
    assert_eq!(h.results.all_for_service(service.id).await.len(), 5);
}

#[tokio::test]
async fn test_dependency_failure_is_attributed() {
    let checker = Arc::new(
        ScriptedChecker::new(ServiceStatus::Up)
            .script("db-ping", &[ServiceStatus::Down])
            .script("api-ping", &[ServiceStatus::Down]),
    );
    let h = harness(checker, 10);

    let db = h.repo.add_service("db", "Database").await;
    let api = h.repo.add_service("api", "API").await;
    h.repo
        .add_dependency(api.id, db.id, DependencyKind::Hard, 1.0)
        .await;

    // db 先检查，api 的检查晚一个周期，保证依赖快照先存在
    h.repo
        .add_check(db.id, "db-ping", "https://db/health", 3600, 1.0, Utc::now())
        .await;
    h.repo
        .add_check(
            api.id,
            "api-ping",
            "https://api/health",
            3600,
            1.0,
            Utc::now() + ChronoDuration::seconds(60),
        )
        .await;

    assert_eq!(h.scheduler.scan_and_enqueue(Utc::now()).await.unwrap(), 1);
    h.worker.poll_once(Utc::now()).await.unwrap();
    h.worker.wait_for_idle().await;

    let db_snapshots = h.snapshots.all_for_service(db.id).await;
    assert_eq!(db_snapshots.last().unwrap().status, ServiceStatus::Down);

    let later = Utc::now() + ChronoDuration::seconds(61);
    assert_eq!(h.scheduler.scan_and_enqueue(later).await.unwrap(), 1);
    h.worker.poll_once(later).await.unwrap();
    h.worker.wait_for_idle().await;

    let api_snapshot = h.snapshots.all_for_service(api.id).await.pop().unwrap();
    assert_eq!(api_snapshot.raw_score, 0.0);
    assert!(api_snapshot.dependency_impacted);
    assert_eq!(api_snapshot.probable_root_service_id, Some(db.id));
    // 单个 hard 依赖 down，weight 1.0：confidence = 1/(1+1) = 0.5
    assert_eq!(api_snapshot.attribution_confidence, 0.5);
    assert_eq!(api_snapshot.effective_score, 50.0);

    let api_incidents = h.incidents.all_for_service(api.id).await;
    assert_eq!(api_incidents.len(), 1);
    assert_eq!(api_incidents[0].probable_root_service_id, Some(db.id));
    assert_eq!(api_incidents[0].confidence, 0.5);
}

#[tokio::test]
async fn test_recovery_resolves_incident() {
    let checker = Arc::new(
        ScriptedChecker::new(ServiceStatus::Up)
            .script("http", &[ServiceStatus::Down, ServiceStatus::Up]),
    );
    let h = harness(checker, 10);

    let service = h.repo.add_service("gateway", "Gateway").await;
    h.repo
        .add_check(service.id, "http", "https://gw/health", 60, 1.0, Utc::now())
        .await;

    // 第一轮：down，打开事件
    h.scheduler.scan_and_enqueue(Utc::now()).await.unwrap();
    h.worker.poll_once(Utc::now()).await.unwrap();
    h.worker.wait_for_idle().await;

    let incidents = h.incidents.all_for_service(service.id).await;
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].status, IncidentStatus::Open);

    // 第二轮：恢复，事件解除
    let later = Utc::now() + ChronoDuration::seconds(120);
    assert_eq!(h.scheduler.scan_and_enqueue(later).await.unwrap(), 1);
    h.worker.poll_once(later).await.unwrap();
    h.worker.wait_for_idle().await;

    let snapshots = h.snapshots.all_for_service(service.id).await;
    assert_eq!(snapshots.last().unwrap().status, ServiceStatus::Up);

    let incidents = h.incidents.all_for_service(service.id).await;
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].status, IncidentStatus::Resolved);
    assert!(incidents[0].resolved_at.is_some());
}

#[tokio::test]
async fn test_disabled_check_completes_without_result() {
    let h = harness(Arc::new(ScriptedChecker::new(ServiceStatus::Up)), 10);

    let service = h.repo.add_service("gateway", "Gateway").await;
    let check = h
        .repo
        .add_check(service.id, "http", "https://gw/health", 3600, 1.0, Utc::now())
        .await;

    h.scheduler.scan_and_enqueue(Utc::now()).await.unwrap();
    // 入队后检查被停用
    h.repo.set_check_enabled(check.id, false).await;

    h.worker.poll_once(Utc::now()).await.unwrap();
    h.worker.wait_for_idle().await;

    let counts = h.queue.counts_by_status().await;
    assert_eq!(counts.get(&TaskStatus::Done), Some(&1));
    assert!(h.results.all_for_service(service.id).await.is_empty());
    assert!(h.snapshots.all_for_service(service.id).await.is_empty());
}
