use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use statuswatch_core::{MonitorError, MonitorResult};
use statuswatch_domain::entities::{ServiceCheck, ServiceDependency};
use statuswatch_domain::repositories::ServiceRepository;

pub struct PostgresServiceRepository {
    pool: PgPool,
}

impl PostgresServiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_check(row: &sqlx::postgres::PgRow) -> MonitorResult<ServiceCheck> {
        Ok(ServiceCheck {
            id: row.try_get("id")?,
            service_id: row.try_get("service_id")?,
            check_key: row.try_get("check_key")?,
            endpoint: row.try_get("endpoint")?,
            interval_seconds: row.try_get("interval_seconds")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            weight: row.try_get("weight")?,
            enabled: row.try_get("enabled")?,
            next_due_at: row.try_get("next_due_at")?,
        })
    }
}

const CHECK_COLUMNS: &str = "id, service_id, check_key, endpoint, interval_seconds, \
     timeout_seconds, weight, enabled, next_due_at";

#[async_trait]
impl ServiceRepository for PostgresServiceRepository {
    #[instrument(skip(self), fields(check_id = %check_id))]
    async fn get_check(&self, check_id: i64) -> MonitorResult<Option<ServiceCheck>> {
        let row = sqlx::query(&format!(
            "SELECT {CHECK_COLUMNS} FROM service_checks WHERE id = $1"
        ))
        .bind(check_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_check).transpose()
    }

    #[instrument(skip(self), fields(limit = %limit))]
    async fn list_due_checks(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> MonitorResult<Vec<ServiceCheck>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.service_id, c.check_key, c.endpoint, c.interval_seconds,
                   c.timeout_seconds, c.weight, c.enabled, c.next_due_at
            FROM service_checks c
            JOIN services s ON s.id = c.service_id
            WHERE s.is_active = TRUE AND c.enabled = TRUE AND c.next_due_at <= $1
            ORDER BY c.next_due_at ASC, c.id ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let checks: MonitorResult<Vec<ServiceCheck>> =
            rows.iter().map(Self::row_to_check).collect();
        let checks = checks?;
        debug!("查询到 {} 个到期检查", checks.len());
        Ok(checks)
    }

    #[instrument(skip(self), fields(check_id = %check_id))]
    async fn set_check_next_due(
        &self,
        check_id: i64,
        next_due_at: DateTime<Utc>,
    ) -> MonitorResult<()> {
        let result = sqlx::query("UPDATE service_checks SET next_due_at = $2 WHERE id = $1")
            .bind(check_id)
            .bind(next_due_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MonitorError::CheckNotFound { id: check_id });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(service_id = %service_id))]
    async fn list_enabled_checks(&self, service_id: i64) -> MonitorResult<Vec<ServiceCheck>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHECK_COLUMNS} FROM service_checks WHERE service_id = $1 AND enabled = TRUE ORDER BY id"
        ))
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_check).collect()
    }

    #[instrument(skip(self), fields(service_id = %service_id))]
    async fn list_dependencies(
        &self,
        service_id: i64,
    ) -> MonitorResult<Vec<ServiceDependency>> {
        let rows = sqlx::query(
            r#"
            SELECT id, service_id, depends_on_service_id, kind, weight
            FROM service_dependencies
            WHERE service_id = $1
            ORDER BY id
            "#,
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ServiceDependency {
                    id: row.try_get("id")?,
                    service_id: row.try_get("service_id")?,
                    depends_on_service_id: row.try_get("depends_on_service_id")?,
                    kind: row.try_get("kind")?,
                    weight: row.try_get("weight")?,
                })
            })
            .collect()
    }
}
