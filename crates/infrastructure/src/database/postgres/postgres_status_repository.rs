use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use statuswatch_core::{MonitorError, MonitorResult};
use statuswatch_domain::entities::{Incident, ServiceSnapshot, ServiceStatus};
use statuswatch_domain::repositories::{IncidentRepository, SnapshotRepository};

/// 服务快照仓储（派生视图，只追加）
pub struct PostgresSnapshotRepository {
    pool: PgPool,
}

impl PostgresSnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotRepository for PostgresSnapshotRepository {
    #[instrument(skip(self, snapshot), fields(service_id = %snapshot.service_id, status = %snapshot.status))]
    async fn append(&self, snapshot: &ServiceSnapshot) -> MonitorResult<ServiceSnapshot> {
        let row = sqlx::query(
            r#"
            INSERT INTO service_snapshots
                (service_id, observed_at, raw_score, effective_score, status,
                 dependency_impacted, attribution_confidence, probable_root_service_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(snapshot.service_id)
        .bind(snapshot.observed_at)
        .bind(snapshot.raw_score)
        .bind(snapshot.effective_score)
        .bind(snapshot.status)
        .bind(snapshot.dependency_impacted)
        .bind(snapshot.attribution_confidence)
        .bind(snapshot.probable_root_service_id)
        .fetch_one(&self.pool)
        .await?;

        let mut stored = snapshot.clone();
        stored.id = row.try_get("id")?;
        Ok(stored)
    }

    #[instrument(skip(self), fields(service_id = %service_id))]
    async fn latest_status(&self, service_id: i64) -> MonitorResult<Option<ServiceStatus>> {
        let row = sqlx::query(
            r#"
            SELECT status FROM service_snapshots
            WHERE service_id = $1
            ORDER BY observed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.try_get("status").map_err(MonitorError::from))
            .transpose()
    }
}

/// 事件仓储
pub struct PostgresIncidentRepository {
    pool: PgPool,
}

impl PostgresIncidentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_incident(row: &sqlx::postgres::PgRow) -> MonitorResult<Incident> {
        Ok(Incident {
            id: row.try_get("id")?,
            service_id: row.try_get("service_id")?,
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            resolved_at: row.try_get("resolved_at")?,
            peak_severity: row.try_get("peak_severity")?,
            probable_root_service_id: row.try_get("probable_root_service_id")?,
            confidence: row.try_get("confidence")?,
            summary: row.try_get("summary")?,
        })
    }
}

const INCIDENT_COLUMNS: &str = "id, service_id, status, started_at, resolved_at, \
     peak_severity, probable_root_service_id, confidence, summary";

#[async_trait]
impl IncidentRepository for PostgresIncidentRepository {
    #[instrument(skip(self), fields(service_id = %service_id))]
    async fn find_open(&self, service_id: i64) -> MonitorResult<Option<Incident>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {INCIDENT_COLUMNS} FROM incidents
            WHERE service_id = $1 AND status = 'open'
            ORDER BY started_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_incident).transpose()
    }

    #[instrument(skip(self, incident), fields(service_id = %incident.service_id))]
    async fn insert(&self, incident: &Incident) -> MonitorResult<Incident> {
        let row = sqlx::query(
            r#"
            INSERT INTO incidents
                (service_id, status, started_at, resolved_at, peak_severity,
                 probable_root_service_id, confidence, summary)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(incident.service_id)
        .bind(incident.status)
        .bind(incident.started_at)
        .bind(incident.resolved_at)
        .bind(incident.peak_severity)
        .bind(incident.probable_root_service_id)
        .bind(incident.confidence)
        .bind(&incident.summary)
        .fetch_one(&self.pool)
        .await?;

        let mut stored = incident.clone();
        stored.id = row.try_get("id")?;
        Ok(stored)
    }

    #[instrument(skip(self, incident), fields(incident_id = %incident.id))]
    async fn update(&self, incident: &Incident) -> MonitorResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE incidents
            SET status = $2, resolved_at = $3, peak_severity = $4,
                probable_root_service_id = $5, confidence = $6, summary = $7
            WHERE id = $1
            "#,
        )
        .bind(incident.id)
        .bind(incident.status)
        .bind(incident.resolved_at)
        .bind(incident.peak_severity)
        .bind(incident.probable_root_service_id)
        .bind(incident.confidence)
        .bind(&incident.summary)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MonitorError::Internal(format!(
                "事件不存在: {}",
                incident.id
            )));
        }
        Ok(())
    }
}
