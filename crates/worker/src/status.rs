use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use statuswatch_core::MonitorResult;
use statuswatch_domain::entities::{
    DependencySignal, Incident, IncidentStatus, ServiceSnapshot, ServiceStatus,
};
use statuswatch_domain::repositories::{
    CheckResultRepository, IncidentRepository, ServiceRepository, SnapshotRepository,
};
use statuswatch_domain::snapshot::compose_score;

/// 服务状态合成服务
///
/// 在每次结果写入后重算服务快照并同步事件状态。
/// 快照是派生视图，评分与归因本身是纯函数。
pub struct StatusService {
    service_repo: Arc<dyn ServiceRepository>,
    result_repo: Arc<dyn CheckResultRepository>,
    snapshot_repo: Arc<dyn SnapshotRepository>,
    incident_repo: Arc<dyn IncidentRepository>,
}

impl StatusService {
    pub fn new(
        service_repo: Arc<dyn ServiceRepository>,
        result_repo: Arc<dyn CheckResultRepository>,
        snapshot_repo: Arc<dyn SnapshotRepository>,
        incident_repo: Arc<dyn IncidentRepository>,
    ) -> Self {
        Self {
            service_repo,
            result_repo,
            snapshot_repo,
            incident_repo,
        }
    }

    /// 重算服务快照
    #[instrument(skip(self), fields(service_id = %service_id))]
    pub async fn recompute(
        &self,
        service_id: i64,
        observed_at: DateTime<Utc>,
    ) -> MonitorResult<ServiceSnapshot> {
        let checks = self.service_repo.list_enabled_checks(service_id).await?;
        let weights: HashMap<String, f64> = checks
            .iter()
            .map(|check| (check.check_key.clone(), check.weight))
            .collect();

        // 只统计仍启用的检查的最新结果
        let mut results = self.result_repo.latest_by_service(service_id).await?;
        results.retain(|result| weights.contains_key(&result.check_key));

        let signals = self.dependency_signals(service_id).await?;
        let score = compose_score(&results, &weights, &signals);

        let snapshot = ServiceSnapshot {
            id: 0,
            service_id,
            observed_at,
            raw_score: score.raw_score,
            effective_score: score.effective_score,
            status: score.status,
            dependency_impacted: score.dependency_impacted,
            attribution_confidence: score.attribution_confidence,
            probable_root_service_id: score.probable_root_service_id,
        };
        let stored = self.snapshot_repo.append(&snapshot).await?;

        self.sync_incident(&stored).await?;

        debug!(
            "服务 {} 快照已更新: raw={} effective={} status={}",
            service_id, stored.raw_score, stored.effective_score, stored.status
        );
        Ok(stored)
    }

    /// 依赖图加上各依赖的最新状态，尚无快照的依赖不产生信号
    async fn dependency_signals(&self, service_id: i64) -> MonitorResult<Vec<DependencySignal>> {
        let dependencies = self.service_repo.list_dependencies(service_id).await?;

        let mut signals = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            let Some(status) = self
                .snapshot_repo
                .latest_status(dependency.depends_on_service_id)
                .await?
            else {
                continue;
            };
            signals.push(DependencySignal {
                dependency_service_id: dependency.depends_on_service_id,
                dependency_status: status,
                kind: dependency.kind,
                weight: dependency.weight,
            });
        }
        Ok(signals)
    }

    /// 事件状态同步
    ///
    /// up 解除当前事件；非 up 打开新事件或更新现有事件，
    /// 峰值严重程度只升不降。
    async fn sync_incident(&self, snapshot: &ServiceSnapshot) -> MonitorResult<()> {
        let open_incident = self.incident_repo.find_open(snapshot.service_id).await?;

        if snapshot.status == ServiceStatus::Up {
            let Some(mut incident) = open_incident else {
                return Ok(());
            };
            incident.status = IncidentStatus::Resolved;
            incident.resolved_at = Some(snapshot.observed_at);
            self.incident_repo.update(&incident).await?;
            debug!("服务 {} 的事件 {} 已解除", snapshot.service_id, incident.id);
            return Ok(());
        }

        match open_incident {
            None => {
                let incident = Incident {
                    id: 0,
                    service_id: snapshot.service_id,
                    status: IncidentStatus::Open,
                    started_at: snapshot.observed_at,
                    resolved_at: None,
                    peak_severity: snapshot.status,
                    probable_root_service_id: snapshot.probable_root_service_id,
                    confidence: snapshot.attribution_confidence,
                    summary: Some(format!("Service entered {} state", snapshot.status)),
                };
                let stored = self.incident_repo.insert(&incident).await?;
                debug!(
                    "服务 {} 打开事件 {}: {}",
                    snapshot.service_id, stored.id, snapshot.status
                );
            }
            Some(mut incident) => {
                if snapshot.status.severity_rank() > incident.peak_severity.severity_rank() {
                    incident.peak_severity = snapshot.status;
                }
                incident.probable_root_service_id = snapshot.probable_root_service_id;
                incident.confidence = snapshot.attribution_confidence;
                self.incident_repo.update(&incident).await?;
            }
        }
        Ok(())
    }
}
