//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则。
//! 任务队列的操作必须是原子的条件更新：并发的调度器不会重复入队同一
//! 应检时刻，并发的 Worker 不会同时持有同一任务的有效租约。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::entities::{
    CheckResult, CheckTask, Incident, NewCheckTask, ServiceCheck, ServiceDependency,
    ServiceSnapshot, ServiceStatus,
};
use statuswatch_core::MonitorResult;

/// 入队结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(i64),
    /// 同一 (检查, 应检时刻) 已存在未终结任务，幂等跳过
    AlreadyExists,
}

/// 完成结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    Completed,
    /// 租约已过期并被他人接管，本次完成作废
    LostLease,
}

/// 失败处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// 任务退回待执行，按退避延后
    Retried { next_attempt_at: DateTime<Utc> },
    /// 重试次数耗尽，进入死信终态
    DeadLettered,
    /// 租约已转移，本次失败上报作废
    LostLease,
}

/// 服务与检查配置仓储
#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn get_check(&self, check_id: i64) -> MonitorResult<Option<ServiceCheck>>;
    /// 活跃服务中已启用且到期（next_due_at <= now）的检查，按到期时间升序
    async fn list_due_checks(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> MonitorResult<Vec<ServiceCheck>>;
    async fn set_check_next_due(
        &self,
        check_id: i64,
        next_due_at: DateTime<Utc>,
    ) -> MonitorResult<()>;
    async fn list_enabled_checks(&self, service_id: i64) -> MonitorResult<Vec<ServiceCheck>>;
    async fn list_dependencies(&self, service_id: i64)
        -> MonitorResult<Vec<ServiceDependency>>;
}

/// 检查任务队列
///
/// 所有状态迁移都以 (status, lease_owner) 为条件执行；
/// 丢失租约的调用方得到明确的 LostLease 结果而非错误。
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 幂等入队：同一 (check_id, scheduled_for) 只会存在一个任务
    async fn enqueue(&self, task: NewCheckTask) -> MonitorResult<EnqueueOutcome>;

    /// 原子领取一批到期任务
    ///
    /// 候选为 pending 或租约已过期的 leased 任务，且 scheduled_for <= now；
    /// 按 scheduled_for 升序、id 升序发放；不修改 attempt_count。
    async fn lease_batch(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        max_count: usize,
        lease_duration: Duration,
    ) -> MonitorResult<Vec<CheckTask>>;

    /// 完成任务（须仍持有租约）
    async fn complete(&self, task_id: i64, worker_id: &str) -> MonitorResult<CompleteOutcome>;

    /// 上报失败：attempt_count 加一；未达上限则退回 pending 并按退避
    /// 延后 scheduled_for，达到上限则进入 failed 终态
    async fn fail(
        &self,
        task_id: i64,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> MonitorResult<FailOutcome>;

    /// 提前释放（不计失败次数），用于并发额度耗尽时的回退
    async fn release(&self, task_id: i64, worker_id: &str) -> MonitorResult<()>;

    /// 把租约已过期的任务收回为 pending，返回收回数量
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> MonitorResult<u64>;
}

/// 检查结果仓储（只追加）
#[async_trait]
pub trait CheckResultRepository: Send + Sync {
    async fn record(
        &self,
        task_id: i64,
        service_id: i64,
        check_id: i64,
        result: &CheckResult,
    ) -> MonitorResult<()>;

    /// 服务下每个已启用检查的最新一条结果（尚无结果的检查不出现）
    async fn latest_by_service(&self, service_id: i64) -> MonitorResult<Vec<CheckResult>>;
}

/// 服务快照仓储（派生视图，只追加）
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn append(&self, snapshot: &ServiceSnapshot) -> MonitorResult<ServiceSnapshot>;
    async fn latest_status(&self, service_id: i64) -> MonitorResult<Option<ServiceStatus>>;
}

/// 事件仓储
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// 服务当前打开的事件（若有多个取最近开始的）
    async fn find_open(&self, service_id: i64) -> MonitorResult<Option<Incident>>;
    async fn insert(&self, incident: &Incident) -> MonitorResult<Incident>;
    async fn update(&self, incident: &Incident) -> MonitorResult<()>;
}
