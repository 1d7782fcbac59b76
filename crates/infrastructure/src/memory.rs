//! 内存存储实现
//!
//! 面向嵌入式部署与测试场景：所有仓储契约与 Postgres 实现一致，
//! 原子性由单把锁保证。队列状态机的条件迁移在这里与数据库实现
//! 共享同一套语义。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use statuswatch_core::{MonitorError, MonitorResult};
use statuswatch_domain::backoff::retry_delay;
use statuswatch_domain::entities::{
    CheckResult, CheckTask, Incident, NewCheckTask, Service, ServiceCheck, ServiceDependency,
    ServiceSnapshot, ServiceStatus, TaskStatus,
};
use statuswatch_domain::repositories::{
    CheckResultRepository, CompleteOutcome, EnqueueOutcome, FailOutcome, IncidentRepository,
    ServiceRepository, SnapshotRepository, TaskQueue,
};

#[derive(Debug, Default)]
struct QueueState {
    tasks: BTreeMap<i64, CheckTask>,
    ids_by_key: HashMap<String, i64>,
    next_id: i64,
}

/// 内存检查任务队列
#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    state: Mutex<QueueState>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按 id 取任务快照（测试用）
    pub async fn task(&self, id: i64) -> Option<CheckTask> {
        self.state.lock().await.tasks.get(&id).cloned()
    }

    /// 各状态的任务数量（测试用）
    pub async fn counts_by_status(&self) -> HashMap<TaskStatus, usize> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for task in state.tasks.values() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: NewCheckTask) -> MonitorResult<EnqueueOutcome> {
        let mut state = self.state.lock().await;

        let key = CheckTask::idempotency_key(task.check_id, task.scheduled_for);
        if state.ids_by_key.contains_key(&key) {
            return Ok(EnqueueOutcome::AlreadyExists);
        }

        state.next_id += 1;
        let id = state.next_id;
        let check_task = CheckTask {
            id,
            service_id: task.service_id,
            check_id: task.check_id,
            check_key: task.check_key,
            scheduled_for: task.scheduled_for,
            status: TaskStatus::Pending,
            lease_owner: None,
            lease_expires_at: None,
            attempt_count: 0,
            max_attempts: task.max_attempts,
            created_at: Utc::now(),
        };
        state.ids_by_key.insert(key, id);
        state.tasks.insert(id, check_task);

        Ok(EnqueueOutcome::Enqueued(id))
    }

    async fn lease_batch(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        max_count: usize,
        lease_duration: Duration,
    ) -> MonitorResult<Vec<CheckTask>> {
        let mut state = self.state.lock().await;

        let mut candidates: Vec<i64> = state
            .tasks
            .values()
            .filter(|task| {
                task.scheduled_for <= now
                    && (task.status == TaskStatus::Pending
                        || (task.status == TaskStatus::Leased && task.lease_expired(now)))
            })
            .map(|task| task.id)
            .collect();

        // 最早到期优先，id 升序兜底
        candidates.sort_by_key(|id| {
            let task = &state.tasks[id];
            (task.scheduled_for, task.id)
        });
        candidates.truncate(max_count);

        let lease_expires_at = now + lease_duration;
        let mut leased = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(task) = state.tasks.get_mut(&id) {
                task.status = TaskStatus::Leased;
                task.lease_owner = Some(worker_id.to_string());
                task.lease_expires_at = Some(lease_expires_at);
                leased.push(task.clone());
            }
        }

        Ok(leased)
    }

    async fn complete(&self, task_id: i64, worker_id: &str) -> MonitorResult<CompleteOutcome> {
        let mut state = self.state.lock().await;

        let Some(task) = state.tasks.get_mut(&task_id) else {
            return Err(MonitorError::task_not_found(task_id));
        };
        if task.status != TaskStatus::Leased || task.lease_owner.as_deref() != Some(worker_id) {
            debug!(task_id, worker_id, "完成时租约已转移，忽略本次结果");
            return Ok(CompleteOutcome::LostLease);
        }

        task.status = TaskStatus::Done;
        task.lease_owner = None;
        task.lease_expires_at = None;
        Ok(CompleteOutcome::Completed)
    }

    async fn fail(
        &self,
        task_id: i64,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> MonitorResult<FailOutcome> {
        let mut state = self.state.lock().await;

        let Some(task) = state.tasks.get_mut(&task_id) else {
            return Err(MonitorError::task_not_found(task_id));
        };
        if task.status != TaskStatus::Leased || task.lease_owner.as_deref() != Some(worker_id) {
            debug!(task_id, worker_id, "失败上报时租约已转移，忽略");
            return Ok(FailOutcome::LostLease);
        }

        task.attempt_count += 1;
        task.lease_owner = None;
        task.lease_expires_at = None;

        if task.attempt_count >= task.max_attempts {
            task.status = TaskStatus::Failed;
            return Ok(FailOutcome::DeadLettered);
        }

        let next_attempt_at = now + retry_delay(task.attempt_count);
        task.status = TaskStatus::Pending;
        task.scheduled_for = next_attempt_at;
        Ok(FailOutcome::Retried { next_attempt_at })
    }

    async fn release(&self, task_id: i64, worker_id: &str) -> MonitorResult<()> {
        let mut state = self.state.lock().await;

        let Some(task) = state.tasks.get_mut(&task_id) else {
            return Err(MonitorError::task_not_found(task_id));
        };
        if task.status != TaskStatus::Leased || task.lease_owner.as_deref() != Some(worker_id) {
            debug!(task_id, worker_id, "释放时租约已转移，忽略");
            return Ok(());
        }

        task.status = TaskStatus::Pending;
        task.lease_owner = None;
        task.lease_expires_at = None;
        Ok(())
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> MonitorResult<u64> {
        let mut state = self.state.lock().await;

        let mut reclaimed = 0;
        for task in state.tasks.values_mut() {
            if task.status == TaskStatus::Leased && task.lease_expired(now) {
                task.status = TaskStatus::Pending;
                task.lease_owner = None;
                task.lease_expires_at = None;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    services: Vec<Service>,
    checks: Vec<ServiceCheck>,
    dependencies: Vec<ServiceDependency>,
    next_service_id: i64,
    next_check_id: i64,
    next_dependency_id: i64,
}

/// 内存服务配置仓储
#[derive(Debug, Default)]
pub struct MemoryServiceRepository {
    state: RwLock<ServiceState>,
}

impl MemoryServiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_service(&self, slug: &str, name: &str) -> Service {
        let mut state = self.state.write().await;
        state.next_service_id += 1;
        let now = Utc::now();
        let service = Service {
            id: state.next_service_id,
            slug: slug.to_string(),
            name: name.to_string(),
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.services.push(service.clone());
        service
    }

    pub async fn add_check(
        &self,
        service_id: i64,
        check_key: &str,
        endpoint: &str,
        interval_seconds: i64,
        weight: f64,
        next_due_at: DateTime<Utc>,
    ) -> ServiceCheck {
        let mut state = self.state.write().await;
        state.next_check_id += 1;
        let check = ServiceCheck {
            id: state.next_check_id,
            service_id,
            check_key: check_key.to_string(),
            endpoint: endpoint.to_string(),
            interval_seconds,
            timeout_seconds: 5.0,
            weight,
            enabled: true,
            next_due_at,
        };
        state.checks.push(check.clone());
        check
    }

    pub async fn add_dependency(
        &self,
        service_id: i64,
        depends_on_service_id: i64,
        kind: statuswatch_domain::entities::DependencyKind,
        weight: f64,
    ) -> ServiceDependency {
        let mut state = self.state.write().await;
        state.next_dependency_id += 1;
        let dependency = ServiceDependency {
            id: state.next_dependency_id,
            service_id,
            depends_on_service_id,
            kind,
            weight,
        };
        state.dependencies.push(dependency.clone());
        dependency
    }

    pub async fn set_service_active(&self, service_id: i64, is_active: bool) {
        let mut state = self.state.write().await;
        if let Some(service) = state.services.iter_mut().find(|s| s.id == service_id) {
            service.is_active = is_active;
        }
    }

    pub async fn set_check_enabled(&self, check_id: i64, enabled: bool) {
        let mut state = self.state.write().await;
        if let Some(check) = state.checks.iter_mut().find(|c| c.id == check_id) {
            check.enabled = enabled;
        }
    }
}

#[async_trait]
impl ServiceRepository for MemoryServiceRepository {
    async fn get_check(&self, check_id: i64) -> MonitorResult<Option<ServiceCheck>> {
        let state = self.state.read().await;
        Ok(state.checks.iter().find(|c| c.id == check_id).cloned())
    }

    async fn list_due_checks(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> MonitorResult<Vec<ServiceCheck>> {
        let state = self.state.read().await;
        let active_ids: Vec<i64> = state
            .services
            .iter()
            .filter(|s| s.is_active)
            .map(|s| s.id)
            .collect();

        let mut due: Vec<ServiceCheck> = state
            .checks
            .iter()
            .filter(|c| c.enabled && c.next_due_at <= now && active_ids.contains(&c.service_id))
            .cloned()
            .collect();
        due.sort_by_key(|c| (c.next_due_at, c.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn set_check_next_due(
        &self,
        check_id: i64,
        next_due_at: DateTime<Utc>,
    ) -> MonitorResult<()> {
        let mut state = self.state.write().await;
        let Some(check) = state.checks.iter_mut().find(|c| c.id == check_id) else {
            return Err(MonitorError::CheckNotFound { id: check_id });
        };
        check.next_due_at = next_due_at;
        Ok(())
    }

    async fn list_enabled_checks(&self, service_id: i64) -> MonitorResult<Vec<ServiceCheck>> {
        let state = self.state.read().await;
        Ok(state
            .checks
            .iter()
            .filter(|c| c.service_id == service_id && c.enabled)
            .cloned()
            .collect())
    }

    async fn list_dependencies(
        &self,
        service_id: i64,
    ) -> MonitorResult<Vec<ServiceDependency>> {
        let state = self.state.read().await;
        Ok(state
            .dependencies
            .iter()
            .filter(|d| d.service_id == service_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone)]
struct StoredRun {
    seq: u64,
    service_id: i64,
    check_id: i64,
    result: CheckResult,
}

/// 内存检查结果仓储
#[derive(Debug, Default)]
pub struct MemoryResultRepository {
    state: RwLock<(u64, Vec<StoredRun>)>,
}

impl MemoryResultRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 服务下的全部结果记录（测试用）
    pub async fn all_for_service(&self, service_id: i64) -> Vec<CheckResult> {
        let state = self.state.read().await;
        state
            .1
            .iter()
            .filter(|r| r.service_id == service_id)
            .map(|r| r.result.clone())
            .collect()
    }
}

#[async_trait]
impl CheckResultRepository for MemoryResultRepository {
    async fn record(
        &self,
        _task_id: i64,
        service_id: i64,
        check_id: i64,
        result: &CheckResult,
    ) -> MonitorResult<()> {
        let mut state = self.state.write().await;
        state.0 += 1;
        let seq = state.0;
        state.1.push(StoredRun {
            seq,
            service_id,
            check_id,
            result: result.clone(),
        });
        Ok(())
    }

    async fn latest_by_service(&self, service_id: i64) -> MonitorResult<Vec<CheckResult>> {
        let state = self.state.read().await;
        let mut latest: HashMap<i64, &StoredRun> = HashMap::new();
        for run in state.1.iter().filter(|r| r.service_id == service_id) {
            match latest.get(&run.check_id) {
                Some(existing) if existing.seq >= run.seq => {}
                _ => {
                    latest.insert(run.check_id, run);
                }
            }
        }
        Ok(latest.into_values().map(|r| r.result.clone()).collect())
    }
}

/// 内存服务快照仓储
#[derive(Debug, Default)]
pub struct MemorySnapshotRepository {
    state: RwLock<(i64, Vec<ServiceSnapshot>)>,
}

impl MemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all_for_service(&self, service_id: i64) -> Vec<ServiceSnapshot> {
        let state = self.state.read().await;
        state
            .1
            .iter()
            .filter(|s| s.service_id == service_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SnapshotRepository for MemorySnapshotRepository {
    async fn append(&self, snapshot: &ServiceSnapshot) -> MonitorResult<ServiceSnapshot> {
        let mut state = self.state.write().await;
        state.0 += 1;
        let mut stored = snapshot.clone();
        stored.id = state.0;
        state.1.push(stored.clone());
        Ok(stored)
    }

    async fn latest_status(&self, service_id: i64) -> MonitorResult<Option<ServiceStatus>> {
        let state = self.state.read().await;
        Ok(state
            .1
            .iter()
            .filter(|s| s.service_id == service_id)
            .max_by_key(|s| (s.observed_at, s.id))
            .map(|s| s.status))
    }
}

/// 内存事件仓储
#[derive(Debug, Default)]
pub struct MemoryIncidentRepository {
    state: RwLock<(i64, Vec<Incident>)>,
}

impl MemoryIncidentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all_for_service(&self, service_id: i64) -> Vec<Incident> {
        let state = self.state.read().await;
        state
            .1
            .iter()
            .filter(|i| i.service_id == service_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IncidentRepository for MemoryIncidentRepository {
    async fn find_open(&self, service_id: i64) -> MonitorResult<Option<Incident>> {
        let state = self.state.read().await;
        Ok(state
            .1
            .iter()
            .filter(|i| {
                i.service_id == service_id
                    && i.status == statuswatch_domain::entities::IncidentStatus::Open
            })
            .max_by_key(|i| (i.started_at, i.id))
            .cloned())
    }

    async fn insert(&self, incident: &Incident) -> MonitorResult<Incident> {
        let mut state = self.state.write().await;
        state.0 += 1;
        let mut stored = incident.clone();
        stored.id = state.0;
        state.1.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, incident: &Incident) -> MonitorResult<()> {
        let mut state = self.state.write().await;
        let Some(existing) = state.1.iter_mut().find(|i| i.id == incident.id) else {
            return Err(MonitorError::Internal(format!(
                "事件不存在: {}",
                incident.id
            )));
        };
        *existing = incident.clone();
        Ok(())
    }
}
