use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 服务健康状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ServiceStatus {
    #[serde(rename = "up")]
    Up,
    #[serde(rename = "degraded")]
    Degraded,
    #[serde(rename = "down")]
    Down,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Up => "up",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Down => "down",
        }
    }

    /// 严重程度排序，用于事件峰值比较
    pub fn severity_rank(&self) -> u8 {
        match self {
            ServiceStatus::Up => 0,
            ServiceStatus::Degraded => 1,
            ServiceStatus::Down => 2,
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DependencyKind {
    #[serde(rename = "hard")]
    Hard,
    #[serde(rename = "soft")]
    Soft,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceCheck {
    pub id: i64,
    pub service_id: i64,
    pub check_key: String,
    /// 探测目标地址
    pub endpoint: String,
    pub interval_seconds: i64,
    pub timeout_seconds: f64,
    pub weight: f64,
    pub enabled: bool,
    pub next_due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDependency {
    pub id: i64,
    pub service_id: i64,
    pub depends_on_service_id: i64,
    pub kind: DependencyKind,
    pub weight: f64,
}

/// 检查任务状态
///
/// pending → leased → {done | pending(重试) | failed}；
/// done 与 failed 为终态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "leased")]
    Leased,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "failed")]
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckTask {
    pub id: i64,
    pub service_id: i64,
    pub check_id: i64,
    pub check_key: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: TaskStatus,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl CheckTask {
    /// 幂等键：同一检查在同一应检时刻只允许一个任务
    pub fn idempotency_key(check_id: i64, scheduled_for: DateTime<Utc>) -> String {
        format!("{}:{}", check_id, scheduled_for.timestamp())
    }

    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        match self.lease_expires_at {
            Some(expires_at) => expires_at < now,
            None => false,
        }
    }
}

/// 待入队的检查任务，id 由存储层分配
#[derive(Debug, Clone)]
pub struct NewCheckTask {
    pub service_id: i64,
    pub check_id: i64,
    pub check_key: String,
    pub scheduled_for: DateTime<Utc>,
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub check_key: String,
    pub status: ServiceStatus,
    pub observed_at: DateTime<Utc>,
    pub latency_ms: Option<i64>,
    pub http_status: Option<i32>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}

impl CheckResult {
    pub fn up(check_key: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            check_key: check_key.into(),
            status: ServiceStatus::Up,
            observed_at,
            latency_ms: None,
            http_status: None,
            error_code: None,
            error_message: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn down(
        check_key: impl Into<String>,
        observed_at: DateTime<Utc>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            check_key: check_key.into(),
            status: ServiceStatus::Down,
            observed_at,
            latency_ms: None,
            http_status: None,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
            metadata: serde_json::Value::Null,
        }
    }

    /// 重试次数耗尽后的兜底结果，保证下游评分能看到确定的信号
    pub fn max_attempts_exceeded(
        check_key: impl Into<String>,
        observed_at: DateTime<Utc>,
        attempts: i32,
    ) -> Self {
        Self::down(
            check_key,
            observed_at,
            "max_attempts_exceeded",
            format!("check failed after {attempts} attempts"),
        )
    }
}

/// 归因的瞬时输入：依赖边加上该依赖自身的最新状态
#[derive(Debug, Clone, PartialEq)]
pub struct DependencySignal {
    pub dependency_service_id: i64,
    pub dependency_status: ServiceStatus,
    pub kind: DependencyKind,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributionResult {
    pub dependency_impacted: bool,
    pub probable_root_service_id: Option<i64>,
    pub attribution_confidence: f64,
}

impl AttributionResult {
    pub fn not_impacted() -> Self {
        Self {
            dependency_impacted: false,
            probable_root_service_id: None,
            attribution_confidence: 0.0,
        }
    }
}

/// 按需重算的派生视图，不作为事实来源持久化
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceScoreResult {
    pub raw_score: f64,
    pub effective_score: f64,
    pub status: ServiceStatus,
    pub dependency_impacted: bool,
    pub attribution_confidence: f64,
    pub probable_root_service_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSnapshot {
    pub id: i64,
    pub service_id: i64,
    pub observed_at: DateTime<Utc>,
    pub raw_score: f64,
    pub effective_score: f64,
    pub status: ServiceStatus,
    pub dependency_impacted: bool,
    pub attribution_confidence: f64,
    pub probable_root_service_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IncidentStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "resolved")]
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Incident {
    pub id: i64,
    pub service_id: i64,
    pub status: IncidentStatus,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub peak_severity: ServiceStatus,
    pub probable_root_service_id: Option<i64>,
    pub confidence: f64,
    pub summary: Option<String>,
}
